use std::ops::Range;

use crate::{error::Error, store::Transaction};

fn increment(mut next_key: Vec<u8>) -> Vec<u8> {
    for i in (0..next_key.len()).rev() {
        if next_key[i] < 0xff {
            next_key[i] += 1;
            next_key.truncate(i + 1);
            return next_key;
        }
    }
    next_key
}

/// The first key sorting after `key` itself.
pub(crate) fn successor(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    next.push(0);
    next
}

/// Range covering every key that starts with `prefix`.
pub(crate) fn prefix_range(prefix: &[u8]) -> Range<Vec<u8>> {
    prefix.to_vec()..increment(prefix.to_vec())
}

pub(crate) fn entity_data_path(type_path: &str, identity: &str) -> String {
    format!("entity/{}/{}", type_path, identity)
}

pub(crate) fn entity_prefix(type_path: &str) -> String {
    format!("entity/{}/", type_path)
}

pub(crate) fn key_to_string(key: Vec<u8>) -> Result<String, Error> {
    String::from_utf8(key).map_err(Error::InvalidUtf8)
}

/// Pages through `range` until the backend returns a short page.
pub(crate) async fn scan_all<X: Transaction + ?Sized>(
    txn: &mut X,
    range: Range<Vec<u8>>,
    page_size: u32,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
    let mut start_key = range.start;
    let end_key = range.end;
    let mut pairs = Vec::new();
    loop {
        let kvs = txn.scan(start_key.clone()..end_key.clone(), page_size).await?;
        let Some((last, _)) = kvs.last() else {
            break;
        };
        start_key = successor(last);
        let len = kvs.len();
        pairs.extend(kvs);
        if len < page_size as usize {
            break;
        }
    }
    Ok(pairs)
}
