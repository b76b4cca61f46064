extern crate self as kv_persist;

mod config;
mod dao;
mod db;
mod error;
mod extract;
mod filter;
mod meta;
mod query;
mod store;
mod utils;
mod value;

pub use config::Config;
pub use dao::{Dao, DataAccess, QbeOutcome, SaveOutcome};
pub use db::{Db, SessionState};
pub use error::{AccessError, Error};
pub use extract::{extract, extract_all};
pub use filter::{Filter, Predicate};
pub use meta::{
    AttributeDescriptor, EntityMeta, attributes_for, attributes_for_path, lookup,
    registered_entities,
};
pub use query::{Params, Row};
pub use store::{
    Backend, TikvStore, TikvTransaction, Transaction, TransientStore, TransientTransaction,
};
pub use value::{AttributeValue, Value, ValueType};

pub use inventory;
pub use kv_persist_derive::Entity;

/// Entity defines what the access layer needs to know about a persisted type.
///
/// Normally generated by `#[derive(Entity)]` next to `prost::Message`.
pub trait Entity: prost::Message + Default + Clone + Send + Sync + 'static {
    /// Full path of the type, used as the storage key prefix.
    fn type_path() -> &'static str;

    /// String form of the identity field.
    fn identity(&self) -> String;

    /// Attributes declared directly on this type, fields first then getters.
    fn declared_attributes() -> Vec<AttributeDescriptor>;

    /// Reads the field `name` declared `level` supertypes above this type.
    fn read_field(&self, level: usize, name: &str) -> Result<Option<Value>, AccessError>;

    /// Invokes the getter `name` declared `level` supertypes above this type.
    fn call_getter(&self, level: usize, name: &str) -> Result<Option<Value>, AccessError>;

    fn version(&self) -> Option<u64> {
        None
    }

    fn set_version(&mut self, _version: u64) {}
}
