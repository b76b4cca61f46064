use std::{collections::HashSet, ops::Range};

use async_trait::async_trait;
use log::debug;
use tikv_client::{Key, TransactionClient};

use crate::{
    error::Error,
    store::{Backend, Transaction},
    utils::successor,
};

#[derive(Clone)]
pub struct TikvStore {
    pub(crate) client: TransactionClient,
}

impl TikvStore {
    pub async fn new(pd_endpoints: Vec<String>) -> Result<Self, Error> {
        let client = TransactionClient::new(pd_endpoints)
            .await
            .map_err(Error::TikvError)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Backend for TikvStore {
    type Txn = TikvTransaction;

    async fn begin(&self) -> Result<TikvTransaction, Error> {
        let txn = self
            .client
            .begin_optimistic()
            .await
            .map_err(Error::TikvError)?;
        Ok(TikvTransaction {
            client: self.client.clone(),
            txn,
            written: HashSet::new(),
        })
    }

    fn name(&self) -> &'static str {
        "tikv"
    }
}

pub struct TikvTransaction {
    client: TransactionClient,
    txn: tikv_client::Transaction,
    written: HashSet<Vec<u8>>,
}

#[async_trait]
impl Transaction for TikvTransaction {
    async fn get(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        self.txn.get(key).await.map_err(Error::TikvError)
    }

    async fn get_latest(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        if self.written.contains(&key) {
            return self.txn.get(key).await.map_err(Error::TikvError);
        }
        let mut snapshot = self.client.snapshot(
            self.client
                .current_timestamp()
                .await
                .map_err(Error::TikvError)?,
            tikv_client::TransactionOptions::new_optimistic(),
        );
        snapshot.get(key).await.map_err(Error::TikvError)
    }

    async fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), Error> {
        self.written.insert(key.clone());
        self.txn.put(key, value).await.map_err(Error::TikvError)
    }

    async fn delete(&mut self, key: Vec<u8>) -> Result<(), Error> {
        self.written.insert(key.clone());
        self.txn.delete(key).await.map_err(Error::TikvError)
    }

    async fn scan(
        &mut self,
        range: Range<Vec<u8>>,
        limit: u32,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        Ok(self
            .txn
            .scan(Key::from(range.start)..Key::from(range.end), limit)
            .await
            .map_err(Error::TikvError)?
            .map(|kv| (Into::<Vec<u8>>::into(kv.key().clone()), kv.value().clone()))
            .collect())
    }

    async fn delete_range(
        &mut self,
        range: Range<Vec<u8>>,
        page_size: u32,
    ) -> Result<u64, Error> {
        let mut start_key: Key = range.start.into();
        let end_key: Key = range.end.into();
        let mut deleted = 0;
        loop {
            let keys = self
                .txn
                .scan_keys(start_key.clone()..end_key.clone(), page_size)
                .await
                .map_err(Error::TikvError)?
                .collect::<Vec<_>>();
            let Some(last) = keys.last() else {
                break;
            };
            start_key = successor(&Into::<Vec<u8>>::into(last.clone())).into();
            let len = keys.len();
            for key in keys {
                self.written.insert(key.clone().into());
                self.txn.delete(key).await.map_err(Error::TikvError)?;
                deleted += 1;
            }
            if len < page_size as usize {
                break;
            }
        }
        Ok(deleted)
    }

    async fn commit(&mut self) -> Result<(), Error> {
        let written = self.written.len();
        self.written.clear();
        self.txn.commit().await.map_err(into_error)?;
        debug!("tikv commit, {} keys written", written);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), Error> {
        self.written.clear();
        self.txn.rollback().await.map_err(Error::TikvError)
    }
}

fn into_error(err: tikv_client::Error) -> Error {
    if is_write_conflict(&err) {
        Error::StaleObject(err.to_string())
    } else {
        Error::TikvError(err)
    }
}

fn is_write_conflict(err: &tikv_client::Error) -> bool {
    match err {
        tikv_client::Error::KeyError(key_error) => key_error.conflict.is_some(),
        tikv_client::Error::MultipleKeyErrors(errors)
        | tikv_client::Error::ExtractedErrors(errors) => errors.iter().any(is_write_conflict),
        _ => false,
    }
}
