use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::cdc_error;
use crate::error::{CdcResult, ErrorKind};
use crate::store::keys::{KeySpace, extract_key_suffix};
use crate::store::{CasOutcome, CoordinationStore, KeyValue, Revision};
use crate::types::{CaptureInfo, ChangeFeedDetail, ChangeFeedStatus, SubChangeFeedInfo};

/// A decoded value together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub revision: Revision,
    pub value: T,
}

/// Typed operations over a [`CoordinationStore`], with JSON encoded values.
#[derive(Debug, Clone)]
pub struct CoordinationClient<C> {
    store: C,
    keys: KeySpace,
}

impl<C> CoordinationClient<C>
where
    C: CoordinationStore,
{
    pub fn new(store: C, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Returns the read revision and the raw config of every changefeed keyed by id.
    pub async fn get_changefeeds(&self) -> CdcResult<(Revision, HashMap<String, KeyValue>)> {
        let response = self.store.list(&self.keys.changefeed_list()).await?;

        let mut details = HashMap::with_capacity(response.kvs.len());
        for kv in response.kvs {
            let id = extract_key_suffix(&kv.key)?.to_string();
            details.insert(id, kv);
        }

        Ok((response.revision, details))
    }

    pub async fn get_changefeed_detail(
        &self,
        changefeed_id: &str,
    ) -> CdcResult<Option<ChangeFeedDetail>> {
        let key = self.keys.changefeed_config(changefeed_id);
        self.get_decoded(&key).await
    }

    pub async fn save_changefeed_detail(
        &self,
        changefeed_id: &str,
        detail: &ChangeFeedDetail,
    ) -> CdcResult<()> {
        let key = self.keys.changefeed_config(changefeed_id);
        self.store.put(&key, encode(detail)?).await?;

        Ok(())
    }

    pub async fn get_changefeed_status(
        &self,
        changefeed_id: &str,
    ) -> CdcResult<Option<ChangeFeedStatus>> {
        let key = self.keys.changefeed_status(changefeed_id);
        self.get_decoded(&key).await
    }

    pub async fn put_changefeed_status(
        &self,
        changefeed_id: &str,
        status: &ChangeFeedStatus,
    ) -> CdcResult<()> {
        let key = self.keys.changefeed_status(changefeed_id);
        self.store.put(&key, encode(status)?).await?;

        Ok(())
    }

    /// Returns the read revision and every registered capture.
    pub async fn get_captures(&self) -> CdcResult<(Revision, Vec<CaptureInfo>)> {
        let response = self.store.list(&self.keys.capture_list()).await?;

        let captures = response
            .kvs
            .iter()
            .map(|kv| decode(&kv.key, &kv.value))
            .collect::<CdcResult<Vec<CaptureInfo>>>()?;

        Ok((response.revision, captures))
    }

    pub async fn put_capture_info(&self, info: &CaptureInfo) -> CdcResult<()> {
        let key = self.keys.capture_info(&info.id);
        self.store.put(&key, encode(info)?).await?;

        Ok(())
    }

    /// Returns every sub-changefeed record of `changefeed_id` keyed by capture id.
    pub async fn get_sub_changefeed_infos(
        &self,
        changefeed_id: &str,
    ) -> CdcResult<HashMap<String, Versioned<SubChangeFeedInfo>>> {
        let response = self
            .store
            .list(&self.keys.sub_changefeed_list(changefeed_id))
            .await?;

        let mut infos = HashMap::with_capacity(response.kvs.len());
        for kv in response.kvs {
            let capture_id = extract_key_suffix(&kv.key)?.to_string();
            let value = decode(&kv.key, &kv.value)?;
            infos.insert(
                capture_id,
                Versioned {
                    revision: kv.mod_revision,
                    value,
                },
            );
        }

        Ok(infos)
    }

    pub async fn get_sub_changefeed_info(
        &self,
        changefeed_id: &str,
        capture_id: &str,
    ) -> CdcResult<Option<Versioned<SubChangeFeedInfo>>> {
        let key = self.keys.sub_changefeed(changefeed_id, capture_id);
        let Some(kv) = self.store.get(&key).await? else {
            return Ok(None);
        };

        Ok(Some(Versioned {
            revision: kv.mod_revision,
            value: decode(&kv.key, &kv.value)?,
        }))
    }

    /// Unconditionally writes a sub-changefeed record, as the owner does when assigning tables.
    pub async fn put_sub_changefeed_info(
        &self,
        changefeed_id: &str,
        capture_id: &str,
        info: &SubChangeFeedInfo,
    ) -> CdcResult<Revision> {
        let key = self.keys.sub_changefeed(changefeed_id, capture_id);
        self.store.put(&key, encode(info)?).await
    }

    /// Writes a sub-changefeed record only if it is still at `expected` revision.
    pub async fn compare_and_put_sub_changefeed_info(
        &self,
        changefeed_id: &str,
        capture_id: &str,
        info: &SubChangeFeedInfo,
        expected: Revision,
    ) -> CdcResult<CasOutcome> {
        let key = self.keys.sub_changefeed(changefeed_id, capture_id);
        let outcome = self
            .store
            .compare_and_put(&key, encode(info)?, expected)
            .await?;

        debug!(%changefeed_id, %capture_id, expected, ?outcome, "compare and put sub changefeed info");

        Ok(outcome)
    }

    async fn get_decoded<T>(&self, key: &str) -> CdcResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.store.get(key).await? {
            Some(kv) => decode(&kv.key, &kv.value).map(Some),
            None => Ok(None),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> CdcResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|err| {
        cdc_error!(
            ErrorKind::SerializationError,
            "Failed to encode coordination store value",
            source: err
        )
    })
}

fn decode<T: DeserializeOwned>(key: &str, value: &[u8]) -> CdcResult<T> {
    serde_json::from_slice(value).map_err(|err| {
        cdc_error!(
            ErrorKind::DeserializationError,
            "Failed to decode coordination store value",
            detail = key.to_string(),
            source: err
        )
    })
}
