use crate::errors::N1qlError;
use crate::serializer::{Serializer, from_stored};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// One pass over the rows of a query response. Rows are converted as they are pulled.
pub struct Cursor<T> {
    rows: std::vec::IntoIter<Value>,
    serializer: Arc<dyn Serializer>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").field("remaining", &self.rows.len()).finish_non_exhaustive()
    }
}

impl<T: DeserializeOwned> Cursor<T> {
    pub(crate) fn new(rows: Vec<Value>, serializer: Arc<dyn Serializer>) -> Self {
        Self { rows: rows.into_iter(), serializer, _marker: PhantomData }
    }

    /// Rows not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// # Errors
    /// The first row that fails to deserialize.
    pub fn to_vec(self) -> Result<Vec<T>, N1qlError> {
        self.collect()
    }
}

impl<T: DeserializeOwned> Iterator for Cursor<T> {
    type Item = Result<T, N1qlError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(from_stored(self.serializer.as_ref(), row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}
