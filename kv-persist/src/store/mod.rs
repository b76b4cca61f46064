mod tikv;
mod transient;

use std::ops::Range;

use async_trait::async_trait;

use crate::error::Error;

pub use tikv::{TikvStore, TikvTransaction};
pub use transient::{TransientStore, TransientTransaction};

/// A storage engine that hands out transactions over an ordered keyspace.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Txn: Transaction + 'static;

    async fn begin(&self) -> Result<Self::Txn, Error>;

    fn name(&self) -> &'static str;
}

/// One open transaction. Writes are buffered until `commit`.
#[async_trait]
pub trait Transaction: Send {
    /// Reads through the transaction's own view.
    async fn get(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>, Error>;

    /// Own uncommitted write if there is one, otherwise the latest committed value.
    async fn get_latest(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>, Error>;

    async fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), Error>;

    async fn delete(&mut self, key: Vec<u8>) -> Result<(), Error>;

    async fn scan(
        &mut self,
        range: Range<Vec<u8>>,
        limit: u32,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error>;

    /// Deletes every key in `range`, walking it `page_size` keys at a time.
    /// Returns how many were removed.
    async fn delete_range(&mut self, range: Range<Vec<u8>>, page_size: u32) -> Result<u64, Error>;

    /// Fails with [`Error::StaleObject`] when a written key was committed by
    /// someone else after this transaction started.
    async fn commit(&mut self) -> Result<(), Error>;

    async fn rollback(&mut self) -> Result<(), Error>;
}
