//! Lobby protocol messages
//!
//! Every message travels on the lobby topic as a protobuf `Request`: a
//! `type` discriminant (field 1) plus the matching payload (fields 2-4).
//!
//! ```text
//! message Request {
//!   enum Type { SHARE_PRODUCTION = 0; ACCEPT_INVITE = 1; BEGIN_SHOW = 2; CUE_NEXT_ACTOR = 3; }
//!   Type type = 1;
//!   oneof payload {
//!     ShareProduction share_production = 2;
//!     AcceptInvite accept_invite = 3;
//!     BeginShow begin_show = 4;
//!   }
//! }
//! message ShareProduction { string title = 1; string id = 2; }
//! message AcceptInvite { string identity = 1; string name = 2; }
//! message BeginShow { map<string, string> actors_by_part = 1; }
//! ```
//!
//! Part maps are ordered so a decoded message re-encodes to the same bytes.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// The single discovery channel shared by every production
pub const LOBBY_TOPIC: &str = "/cuecannon/1.0.0/lobby";

/// Messages exchanged between peers of a production
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Director announces (or re-announces) a production
    ShareProduction { title: String, id: String },

    /// Actor asks to join the active production
    AcceptInvite { identity: String, name: String },

    /// Director freezes casting and starts the show
    BeginShow {
        actors_by_part: BTreeMap<String, String>,
    },

    /// Advance the shared cue pointer by one line
    CueNextActor,
}

impl Message {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        self.request_type().as_str_name()
    }

    fn request_type(&self) -> wire::RequestType {
        match self {
            Message::ShareProduction { .. } => wire::RequestType::ShareProduction,
            Message::AcceptInvite { .. } => wire::RequestType::AcceptInvite,
            Message::BeginShow { .. } => wire::RequestType::BeginShow,
            Message::CueNextActor => wire::RequestType::CueNextActor,
        }
    }

    /// Serialize to protobuf bytes
    pub fn encode(&self) -> Vec<u8> {
        use prost::Message as _;

        let payload = match self.clone() {
            Message::ShareProduction { title, id } => Some(wire::Payload::ShareProduction(
                wire::ShareProduction { title, id },
            )),
            Message::AcceptInvite { identity, name } => Some(wire::Payload::AcceptInvite(
                wire::AcceptInvite { identity, name },
            )),
            Message::BeginShow { actors_by_part } => {
                Some(wire::Payload::BeginShow(wire::BeginShow { actors_by_part }))
            }
            Message::CueNextActor => None,
        };

        wire::Request {
            r#type: self.request_type() as i32,
            payload,
        }
        .encode_to_vec()
    }

    /// Deserialize from protobuf bytes.
    ///
    /// Fails on malformed bytes, an unknown type, or a payload that does
    /// not match the type.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        use prost::Message as _;

        let request = wire::Request::decode(bytes)?;
        let kind = wire::RequestType::try_from(request.r#type)
            .map_err(|_| Error::Protocol(format!("Unknown message type {}", request.r#type)))?;

        let message = match (kind, request.payload) {
            (
                wire::RequestType::ShareProduction,
                Some(wire::Payload::ShareProduction(p)),
            ) => Message::ShareProduction {
                title: p.title,
                id: p.id,
            },
            (wire::RequestType::AcceptInvite, Some(wire::Payload::AcceptInvite(p))) => {
                Message::AcceptInvite {
                    identity: p.identity,
                    name: p.name,
                }
            }
            (wire::RequestType::BeginShow, Some(wire::Payload::BeginShow(p))) => {
                Message::BeginShow {
                    actors_by_part: p.actors_by_part,
                }
            }
            (wire::RequestType::CueNextActor, None) => Message::CueNextActor,
            (kind, _) => {
                return Err(Error::Protocol(format!(
                    "Payload does not match type {}",
                    kind.as_str_name()
                )))
            }
        };
        Ok(message)
    }
}

/// Protobuf types, field numbers as in the schema above
mod wire {
    use std::collections::BTreeMap;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum RequestType {
        ShareProduction = 0,
        AcceptInvite = 1,
        BeginShow = 2,
        CueNextActor = 3,
    }

    impl RequestType {
        pub fn as_str_name(self) -> &'static str {
            match self {
                RequestType::ShareProduction => "SHARE_PRODUCTION",
                RequestType::AcceptInvite => "ACCEPT_INVITE",
                RequestType::BeginShow => "BEGIN_SHOW",
                RequestType::CueNextActor => "CUE_NEXT_ACTOR",
            }
        }
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Request {
        #[prost(enumeration = "RequestType", tag = "1")]
        pub r#type: i32,
        #[prost(oneof = "Payload", tags = "2, 3, 4")]
        pub payload: Option<Payload>,
    }

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "2")]
        ShareProduction(ShareProduction),
        #[prost(message, tag = "3")]
        AcceptInvite(AcceptInvite),
        #[prost(message, tag = "4")]
        BeginShow(BeginShow),
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ShareProduction {
        #[prost(string, tag = "1")]
        pub title: String,
        #[prost(string, tag = "2")]
        pub id: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct AcceptInvite {
        #[prost(string, tag = "1")]
        pub identity: String,
        #[prost(string, tag = "2")]
        pub name: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct BeginShow {
        #[prost(btree_map = "string, string", tag = "1")]
        pub actors_by_part: BTreeMap<String, String>,
    }
}
