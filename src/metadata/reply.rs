//! Reply assembly for partition operations.
//!
//! Every outcome leaves here as an [`OpStatus`] plus an optional camelCase JSON body.
//! `applied` tells the caller whether the store changed; a mutation whose body failed to
//! encode reports `InternalError` with `applied` set and must not be retried blindly.

use super::partition::{CreateInodeRequest, MetaPartition};
use crate::error::{MetanodeError, OpStatus, Result};
use crate::observability;
use crate::types::{EpochSecs, Inode, InodeId, Lease, LeaseToken};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Attribute snapshot of one inode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InodeInfo {
    pub inode: InodeId,
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub generation: u64,
    pub create_time: EpochSecs,
    pub access_time: EpochSecs,
    pub modify_time: EpochSecs,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub target: Option<Vec<u8>>,
}

/// Link targets travel as standard base64 strings in JSON bodies.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match data {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

impl From<&Inode> for InodeInfo {
    fn from(inode: &Inode) -> Self {
        Self {
            inode: inode.id,
            mode: inode.mode,
            nlink: inode.nlink,
            size: inode.size,
            uid: inode.uid,
            gid: inode.gid,
            generation: inode.generation,
            create_time: inode.create_time,
            access_time: inode.access_time,
            modify_time: inode.modify_time,
            target: inode.link_target.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInodeResponse {
    pub info: InodeInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkInodeResponse {
    pub info: InodeInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInodeResponse {
    pub info: InodeInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeGetResponse {
    pub info: InodeInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInodeGetResponse {
    pub infos: Vec<InodeInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenResponse {
    pub auth_id: u64,
}

/// Lease descriptor. Both fields are zero when no lease is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub auth_id: u64,
    pub auth_time: EpochSecs,
}

impl From<Option<Lease>> for AuthResponse {
    fn from(lease: Option<Lease>) -> Self {
        match lease {
            Some(lease) => Self {
                auth_id: lease.token.0,
                auth_time: lease.expires,
            },
            None => Self {
                auth_id: 0,
                auth_time: 0,
            },
        }
    }
}

/// Status and optional body handed to the wire layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: OpStatus,
    pub body: Option<Vec<u8>>,
    /// Whether the store was changed by this request.
    pub applied: bool,
}

impl Reply {
    /// Bodiless success.
    pub fn ok(applied: bool) -> Self {
        Self {
            status: OpStatus::Ok,
            body: None,
            applied,
        }
    }

    /// Success carrying `body`. An encoding failure becomes `InternalError`.
    pub fn encode<T: Serialize>(body: &T, applied: bool) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => Self {
                status: OpStatus::Ok,
                body: Some(bytes),
                applied,
            },
            Err(e) => {
                error!(error = %e, applied, "Failed to encode reply body");
                Self {
                    status: OpStatus::InternalError,
                    body: Some(e.to_string().into_bytes()),
                    applied,
                }
            }
        }
    }

    /// Classify a failure. Not-found carries no body; other failures carry the message.
    pub fn from_error(err: &MetanodeError) -> Self {
        let status = err.status();
        let body = match status {
            OpStatus::NotExist => None,
            _ => Some(err.to_string().into_bytes()),
        };
        Self {
            status,
            body,
            applied: false,
        }
    }

    /// Decode the JSON body, if any.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.body {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }
}

/// A request addressed to a partition.
#[derive(Debug, Clone)]
pub enum Request {
    CreateInode(CreateInodeRequest),
    UnlinkInode { inode: InodeId },
    Open { inode: InodeId },
    ReleaseOpen { inode: InodeId, token: LeaseToken },
    InodeGet { inode: InodeId },
    InodeGetBatch { inodes: Vec<InodeId> },
    InodeGetAuth { inode: InodeId },
    CreateLinkInode { inode: InodeId },
    EvictInode { inode: InodeId },
    SetAttr { payload: Vec<u8> },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::CreateInode(_) => "create_inode",
            Request::UnlinkInode { .. } => "unlink_inode",
            Request::Open { .. } => "open",
            Request::ReleaseOpen { .. } => "release_open",
            Request::InodeGet { .. } => "inode_get",
            Request::InodeGetBatch { .. } => "inode_get_batch",
            Request::InodeGetAuth { .. } => "inode_get_auth",
            Request::CreateLinkInode { .. } => "create_link_inode",
            Request::EvictInode { .. } => "evict_inode",
            Request::SetAttr { .. } => "set_attr",
        }
    }
}

impl MetaPartition {
    /// Run one request and translate the outcome into a [`Reply`].
    pub async fn handle(&self, request: Request) -> Reply {
        let name = request.name();
        let reply = match request {
            Request::CreateInode(req) => match self.create_inode(req).await {
                Ok(inode) => Reply::encode(
                    &CreateInodeResponse {
                        info: InodeInfo::from(&inode),
                    },
                    true,
                ),
                Err(e) => Reply::from_error(&e),
            },
            Request::UnlinkInode { inode } => match self.unlink_inode(inode).await {
                Ok(inode) => Reply::encode(
                    &UnlinkInodeResponse {
                        info: InodeInfo::from(&inode),
                    },
                    true,
                ),
                Err(e) => Reply::from_error(&e),
            },
            Request::Open { inode } => match self.open(inode).await {
                Ok(lease) => Reply::encode(
                    &OpenResponse {
                        auth_id: lease.token.0,
                    },
                    true,
                ),
                Err(e) => Reply::from_error(&e),
            },
            Request::ReleaseOpen { inode, token } => {
                match self.release_open(inode, token).await {
                    Ok(()) => Reply::ok(true),
                    Err(e) => Reply::from_error(&e),
                }
            }
            Request::InodeGet { inode } => match self.inode_get(inode) {
                Ok(inode) => Reply::encode(
                    &InodeGetResponse {
                        info: InodeInfo::from(&inode),
                    },
                    false,
                ),
                Err(e) => Reply::from_error(&e),
            },
            Request::InodeGetBatch { inodes } => {
                let infos = self
                    .inode_get_batch(&inodes)
                    .iter()
                    .map(InodeInfo::from)
                    .collect();
                Reply::encode(&BatchInodeGetResponse { infos }, false)
            }
            Request::InodeGetAuth { inode } => match self.inode_get_auth(inode) {
                Ok(lease) => Reply::encode(&AuthResponse::from(lease), false),
                Err(e) => Reply::from_error(&e),
            },
            Request::CreateLinkInode { inode } => match self.create_link_inode(inode).await {
                Ok(inode) => Reply::encode(
                    &LinkInodeResponse {
                        info: InodeInfo::from(&inode),
                    },
                    true,
                ),
                Err(e) => Reply::from_error(&e),
            },
            Request::EvictInode { inode } => match self.evict_inode(inode).await {
                Ok(()) => Reply::ok(true),
                Err(e) => Reply::from_error(&e),
            },
            Request::SetAttr { payload } => match self.set_attr(&payload).await {
                Ok(()) => Reply::ok(true),
                Err(e) => Reply::from_error(&e),
            },
        };

        observability::record_reply(name, reply.status);
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serializer that always fails.
    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refusing to encode"))
        }
    }

    #[test]
    fn test_info_uses_camel_case_field_names() {
        let inode = Inode::new(42, 0o644, 1, 2, None, 1_700_000_000);
        let json = serde_json::to_value(InodeInfo::from(&inode)).unwrap();
        assert_eq!(json["inode"], 42);
        assert_eq!(json["createTime"], 1_700_000_000);
        assert!(json.get("target").is_none());

        let auth = serde_json::to_value(AuthResponse::from(None)).unwrap();
        assert_eq!(auth["authId"], 0);
        assert_eq!(auth["authTime"], 0);
    }

    #[test]
    fn test_link_target_is_base64_string() {
        let link = Inode::new(
            7,
            libc::S_IFLNK as u32 | 0o777,
            0,
            0,
            Some(b"/data/a".to_vec()),
            1_700_000_000,
        );
        let info = InodeInfo::from(&link);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["target"], "L2RhdGEvYQ==");

        let back: InodeInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn test_encoding_failure_after_mutation_is_flagged() {
        let reply = Reply::encode(&Unencodable, true);
        assert_eq!(reply.status, OpStatus::InternalError);
        assert!(reply.applied);
    }

    #[test]
    fn test_error_classification() {
        let not_found = Reply::from_error(&MetanodeError::InodeNotFound(3));
        assert_eq!(not_found.status, OpStatus::NotExist);
        assert!(not_found.body.is_none());

        let timeout = Reply::from_error(&MetanodeError::Timeout(1000));
        assert_eq!(timeout.status, OpStatus::Retryable);
        assert!(!timeout.applied);

        let exhausted = Reply::from_error(&MetanodeError::IdSpaceExhausted {
            partition: 1,
            start: 1,
            end: 2,
        });
        assert_eq!(exhausted.status, OpStatus::IdSpaceExhausted);
    }

    #[test]
    fn test_decode_body() {
        let reply = Reply::encode(&OpenResponse { auth_id: 9 }, true);
        let body: OpenResponse = reply.decode_body().unwrap().unwrap();
        assert_eq!(body.auth_id, 9);
        assert!(Reply::ok(false).decode_body::<OpenResponse>().unwrap().is_none());
    }
}
