#![allow(dead_code)]

use std::ops::Range;

use async_trait::async_trait;
use kv_persist::{
    AccessError, AttributeDescriptor, Backend, Entity, Error, Transaction, TransientStore,
    TransientTransaction, Value,
};

#[derive(Clone, PartialEq, ::prost::Message, Entity)]
pub struct Party {
    #[entity(id)]
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub city: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Entity)]
pub struct Person {
    #[entity(id)]
    #[prost(string, tag = "1")]
    pub id: String,
    #[entity(version)]
    #[prost(uint64, tag = "2")]
    pub version: u64,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(int32, tag = "4")]
    pub age: i32,
    #[prost(string, repeated, tag = "5")]
    pub aliases: Vec<String>,
    #[entity(base)]
    #[prost(message, optional, tag = "6")]
    pub party: Option<Party>,
}

impl Person {
    pub fn new(id: &str, name: &str, age: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            age,
            ..Default::default()
        }
    }

    pub fn in_city(mut self, city: &str) -> Self {
        self.party = Some(Party {
            id: self.id.clone(),
            city: city.to_string(),
        });
        self
    }
}

#[derive(Clone, PartialEq, ::prost::Message, Entity)]
#[entity(getter(tier = &'static str))]
pub struct Customer {
    #[entity(id)]
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(uint32, tag = "2")]
    pub spend: u32,
}

impl Customer {
    pub fn tier(&self) -> &'static str {
        match self.spend {
            0 => "",
            1..1000 => "silver",
            _ => "gold",
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message, Entity)]
pub struct Note {
    #[entity(id)]
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, tag = "2")]
    pub text: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Entity)]
pub struct Flag {
    #[entity(id)]
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(bool, optional, tag = "2")]
    pub active: Option<bool>,
}

/// Implements [`Entity`] by hand without registering metadata.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Unlisted {
    #[prost(string, tag = "1")]
    pub id: String,
}

impl Entity for Unlisted {
    fn type_path() -> &'static str {
        "tests::Unlisted"
    }

    fn identity(&self) -> String {
        self.id.clone()
    }

    fn declared_attributes() -> Vec<AttributeDescriptor> {
        Vec::new()
    }

    fn read_field(&self, _level: usize, name: &str) -> Result<Option<Value>, AccessError> {
        Err(AccessError::NoSuchField {
            entity: Self::type_path(),
            name: name.to_string(),
        })
    }

    fn call_getter(&self, _level: usize, name: &str) -> Result<Option<Value>, AccessError> {
        Err(AccessError::NoSuchGetter {
            entity: Self::type_path(),
            name: name.to_string(),
        })
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Transient store whose writes fail for any key containing `poison`.
#[derive(Clone, Default)]
pub struct FailingStore {
    pub inner: TransientStore,
}

pub struct FailingTxn {
    inner: TransientTransaction,
}

#[async_trait]
impl Backend for FailingStore {
    type Txn = FailingTxn;

    async fn begin(&self) -> Result<FailingTxn, Error> {
        Ok(FailingTxn {
            inner: self.inner.begin().await?,
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[async_trait]
impl Transaction for FailingTxn {
    async fn get(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        self.inner.get(key).await
    }

    async fn get_latest(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        self.inner.get_latest(key).await
    }

    async fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), Error> {
        if String::from_utf8_lossy(&key).contains("poison") {
            return Err(Error::Transaction("constraint violated".to_string()));
        }
        self.inner.put(key, value).await
    }

    async fn delete(&mut self, key: Vec<u8>) -> Result<(), Error> {
        self.inner.delete(key).await
    }

    async fn scan(
        &mut self,
        range: Range<Vec<u8>>,
        limit: u32,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        self.inner.scan(range, limit).await
    }

    async fn delete_range(
        &mut self,
        range: Range<Vec<u8>>,
        page_size: u32,
    ) -> Result<u64, Error> {
        self.inner.delete_range(range, page_size).await
    }

    async fn commit(&mut self) -> Result<(), Error> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<(), Error> {
        self.inner.rollback().await
    }
}
