use std::{fmt, marker::PhantomData, ops::Range};

use async_trait::async_trait;
use log::debug;
use prost::Message;

use crate::{
    Entity,
    db::{ActiveSession, Db},
    error::{AccessError, Error},
    extract::extract_all,
    filter::Filter,
    meta::attributes_for,
    query::{Params, Row, bound_key_range, key_range},
    store::{Backend, Transaction},
    utils::{entity_data_path, entity_prefix, key_to_string, prefix_range, scan_all},
};

/// Result of a save attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum SaveOutcome<T> {
    /// Written; carries the object as stored (with its bumped version).
    Saved(T),
    /// Someone else changed the object since it was loaded; carries the
    /// current stored copy. Nothing was written.
    Conflict(T),
}

impl<T> SaveOutcome<T> {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            SaveOutcome::Saved(value) | SaveOutcome::Conflict(value) => value,
        }
    }
}

/// Query by example result, with the attributes that could not be read.
#[derive(Clone, Debug)]
pub struct QbeOutcome<T> {
    pub matches: Vec<T>,
    pub filter: Filter,
    pub diagnostics: Vec<AccessError>,
}

/// Typed persistence operations for one entity type.
#[async_trait]
pub trait DataAccess<T: Entity>: Send + Sync {
    /// Upserts `obj`. Returns `false` when `obj` was stale; it then holds the
    /// stored copy.
    async fn save(&self, obj: &mut T) -> Result<bool, Error>;

    async fn fetch(&self, id: &str) -> Result<Option<T>, Error>;

    async fn fetch_all(&self) -> Result<Vec<T>, Error>;

    /// Runs native query text verbatim.
    async fn find(&self, query: &str) -> Result<Vec<Row>, Error>;

    /// Runs native query text after substituting `:name` placeholders.
    async fn find_with(&self, query: &str, params: &Params) -> Result<Vec<Row>, Error>;

    /// Objects matching every non-empty scalar attribute of `sample`, text
    /// attributes by substring. Attributes named in `excluded` are ignored.
    async fn find_by_example(&self, sample: &T, excluded: &[&str]) -> Result<Vec<T>, Error>;

    async fn delete(&self, obj: &T) -> Result<(), Error>;

    /// Removes every object of the type in one range delete.
    async fn delete_all(&self) -> Result<u64, Error>;
}

pub struct Dao<T, B: Backend> {
    db: Db<B>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, B: Backend> Clone for Dao<T, B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Entity, B: Backend> Dao<T, B> {
    pub fn new(db: &Db<B>) -> Self {
        Self {
            db: db.clone(),
            _marker: PhantomData,
        }
    }

    pub fn db(&self) -> &Db<B> {
        &self.db
    }

    pub fn type_path(&self) -> &'static str {
        T::type_path()
    }

    /// Commits the transaction shared by every dao on the same [`Db`].
    pub async fn commit(&self) -> Result<(), Error> {
        self.db.commit().await
    }

    pub async fn rollback(&self) -> Result<(), Error> {
        self.db.rollback().await
    }

    pub async fn close_session(&self) -> Result<(), Error> {
        self.db.close().await
    }

    pub async fn try_save(&self, obj: &T) -> Result<SaveOutcome<T>, Error> {
        let mut session = self.db.active_session().await?;
        let result = Self::save_in(&mut session, obj).await;
        session.settle("save", result).await
    }

    pub async fn query_by_example(
        &self,
        sample: &T,
        excluded: &[&str],
    ) -> Result<QbeOutcome<T>, Error> {
        let mut session = self.db.active_session().await?;
        let attributes = match attributes_for::<T>(excluded) {
            Ok(attributes) => attributes,
            Err(err) => return session.settle("find_by_example", Err(err)).await,
        };
        let (values, diagnostics) = extract_all(sample, &attributes);
        let filter = Filter::build(values);
        debug!("query by example on {}: {}", T::type_path(), filter);

        let result = self.load_all(&mut session).await.map(|all| {
            all.into_iter()
                .filter(|candidate| filter.matches(candidate))
                .collect()
        });
        let matches = session.settle("find_by_example", result).await?;
        Ok(QbeOutcome {
            matches,
            filter,
            diagnostics,
        })
    }

    async fn save_in(session: &mut ActiveSession<'_, B>, obj: &T) -> Result<SaveOutcome<T>, Error> {
        let key = entity_data_path(T::type_path(), &obj.identity()).into_bytes();
        let txn = session.txn()?;
        let mut saved = obj.clone();
        if let Some(version) = obj.version() {
            if let Some(data) = txn.get_latest(key.clone()).await? {
                let stored = T::decode(data.as_slice()).map_err(Error::DeserializationError)?;
                if stored.version() != Some(version) {
                    debug!(
                        "stale {} {}: version {} loaded, {:?} stored",
                        T::type_path(),
                        obj.identity(),
                        version,
                        stored.version()
                    );
                    return Ok(SaveOutcome::Conflict(stored));
                }
            }
            saved.set_version(version + 1);
        }
        txn.put(key, saved.encode_to_vec()).await?;
        Ok(SaveOutcome::Saved(saved))
    }

    async fn load_all(&self, session: &mut ActiveSession<'_, B>) -> Result<Vec<T>, Error> {
        let range = prefix_range(entity_prefix(T::type_path()).as_bytes());
        scan_all(session.txn()?, range, self.db.page_size())
            .await?
            .into_iter()
            .map(|(_, data)| T::decode(data.as_slice()).map_err(Error::DeserializationError))
            .collect()
    }

    async fn run_query(&self, range: Result<Range<Vec<u8>>, Error>) -> Result<Vec<Row>, Error> {
        let mut session = self.db.active_session().await?;
        let result = match range {
            Ok(range) => match session.txn() {
                Ok(txn) => scan_all(txn, range, self.db.page_size()).await,
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        }
        .and_then(|pairs| {
            pairs
                .into_iter()
                .map(|(key, value)| key_to_string(key).map(|key| Row { key, value }))
                .collect()
        });
        session.settle("find", result).await
    }
}

#[async_trait]
impl<T: Entity, B: Backend> DataAccess<T> for Dao<T, B> {
    async fn save(&self, obj: &mut T) -> Result<bool, Error> {
        match self.try_save(obj).await? {
            SaveOutcome::Saved(saved) => {
                *obj = saved;
                Ok(true)
            }
            SaveOutcome::Conflict(stored) => {
                *obj = stored;
                Ok(false)
            }
        }
    }

    async fn fetch(&self, id: &str) -> Result<Option<T>, Error> {
        let key = entity_data_path(T::type_path(), id).into_bytes();
        let mut session = self.db.active_session().await?;
        let result = match session.txn() {
            Ok(txn) => txn.get(key).await,
            Err(err) => Err(err),
        }
        .and_then(|data| {
            data.map(|data| T::decode(data.as_slice()).map_err(Error::DeserializationError))
                .transpose()
        });
        session.settle("fetch", result).await
    }

    async fn fetch_all(&self) -> Result<Vec<T>, Error> {
        let mut session = self.db.active_session().await?;
        let result = self.load_all(&mut session).await;
        session.settle("fetch_all", result).await
    }

    async fn find(&self, query: &str) -> Result<Vec<Row>, Error> {
        self.run_query(key_range(query)).await
    }

    async fn find_with(&self, query: &str, params: &Params) -> Result<Vec<Row>, Error> {
        self.run_query(bound_key_range(query, params)).await
    }

    async fn find_by_example(&self, sample: &T, excluded: &[&str]) -> Result<Vec<T>, Error> {
        Ok(self.query_by_example(sample, excluded).await?.matches)
    }

    async fn delete(&self, obj: &T) -> Result<(), Error> {
        let key = entity_data_path(T::type_path(), &obj.identity()).into_bytes();
        let mut session = self.db.active_session().await?;
        let result = match session.txn() {
            Ok(txn) => txn.delete(key).await,
            Err(err) => Err(err),
        };
        session.settle("delete", result).await
    }

    async fn delete_all(&self) -> Result<u64, Error> {
        let range = prefix_range(entity_prefix(T::type_path()).as_bytes());
        let mut session = self.db.active_session().await?;
        let result = match session.txn() {
            Ok(txn) => txn.delete_range(range, self.db.page_size()).await,
            Err(err) => Err(err),
        };
        if let Ok(deleted) = &result {
            debug!("deleted {} {}", deleted, T::type_path());
        }
        session.settle("delete_all", result).await
    }
}

impl<T: Entity, B: Backend> fmt::Display for Dao<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(accessed_type: {}){}", T::type_path(), self.db)
    }
}
