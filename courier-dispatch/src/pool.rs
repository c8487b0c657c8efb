//! Round-robin rotation over the configured endpoints.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::{endpoint::Endpoint, error::DispatchError};

/// The endpoints of a session, in file order, with a rotation cursor.
///
/// The cursor advance is atomic, so concurrent callers still see each
/// endpoint in turn.
#[derive(Debug, Default)]
pub struct EndpointPool {
    endpoints: Vec<Arc<Endpoint>>,
    cursor: AtomicUsize,
}

impl EndpointPool {
    pub fn new(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        Self {
            endpoints: endpoints.into_iter().map(Arc::new).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// The endpoint at the cursor; the cursor moves on by one.
    ///
    /// Health is not considered here.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NoEndpointsAvailable`] when the pool is empty.
    pub fn next_candidate(&self) -> Result<Arc<Endpoint>, DispatchError> {
        let len = self.endpoints.len();
        if len == 0 {
            return Err(DispatchError::NoEndpointsAvailable);
        }

        let (Ok(previous) | Err(previous)) =
            self.cursor
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                    Some((cursor + 1) % len)
                });

        Ok(Arc::clone(&self.endpoints[previous % len]))
    }
}

impl FromIterator<Endpoint> for EndpointPool {
    fn from_iter<T: IntoIterator<Item = Endpoint>>(iter: T) -> Self {
        Self::new(iter)
    }
}
