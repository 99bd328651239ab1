//! 最近签发指纹的诊断缓存。只用于观测，任何授权判断都不读取它。

use std::{collections::VecDeque, sync::Mutex};

use fpa_shared_protocol::ClientType;
use serde::Serialize;

use crate::auth::fingerprint::Fingerprint;

/// 缓存快照。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FingerprintSnapshot {
    pub(crate) web: usize,
    pub(crate) mobile: usize,
    pub(crate) total: usize,
    pub(crate) capacity: usize,
}

/// 固定容量的 FIFO；容量为 0 时不记录。
#[derive(Debug)]
pub(crate) struct RecentFingerprints {
    capacity: usize,
    entries: Mutex<VecDeque<(Fingerprint, ClientType)>>,
}

impl RecentFingerprints {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// 记录一次签发；已存在的指纹会移到队尾。
    pub(crate) fn record(&self, fingerprint: &Fingerprint, client_type: ClientType) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.retain(|(existing, _)| existing != fingerprint);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back((fingerprint.clone(), client_type));
    }

    pub(crate) fn snapshot(&self) -> FingerprintSnapshot {
        let Ok(entries) = self.entries.lock() else {
            return FingerprintSnapshot {
                capacity: self.capacity,
                ..FingerprintSnapshot::default()
            };
        };
        let web = entries
            .iter()
            .filter(|(_, client_type)| *client_type == ClientType::Web)
            .count();
        FingerprintSnapshot {
            web,
            mobile: entries.len() - web,
            total: entries.len(),
            capacity: self.capacity,
        }
    }
}
