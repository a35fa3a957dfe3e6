//! In-memory `ServerTransport` for tests.
//!
//! Holds registered users, prekeys, topic keys, and topics in plain
//! `HashMap`s and reproduces the server's status-code semantics without
//! any network I/O.
//!
//! Two endpoints have no server-side counterpart elsewhere in this repo
//! (file-ciphertext upload, and the receipt-forwarding op that backs the
//! "receipt" flow) — this mock and `rv-core`'s `Device::upload`/
//! `Device::send_receipt` agree on a minimal shape for them; see
//! `DESIGN.md`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration as ChronoDuration, Utc};
use rand::RngCore;

use rv_crypto::SigningPublicKey;
use rv_error::Error;
use rv_proto::{
    AllowedUser, ChainState, DeviceDownload, DevicePrekeyBundle, PerDevicePrekeys,
    PrekeyUploadRequest, Receipt, RegistrationBundle, RegistrationResult, SignedPrekey,
    TopicKeyBundle, TopicKeyRequest, TopicKeyResponse, TopicMessageRequest, TopicRecord,
};

use crate::constants::{self, HEADER_AUTH, HEADER_APP, HEADER_COUNT, HEADER_DEVICE, HEADER_RECEIVER, HEADER_USERNAME};
use crate::transport::{Method, Request, ServerTransport};

#[derive(Default)]
struct DeviceInbox {
    user_info: Option<rv_proto::UserInfo>,
    topic_key_messages: Vec<rv_proto::TopicKeyMessage>,
    topic_updates: Vec<TopicRecord>,
    messages: Vec<rv_proto::IncomingUpdate>,
    receipts: Vec<Receipt>,
}

struct ServerDevice {
    user_key: SigningPublicKey,
    auth_token: [u8; 16],
    prekeys: VecDeque<SignedPrekey>,
    inbox: DeviceInbox,
}

struct ServerUser {
    info: rv_proto::UserInfo,
    topic_key_pool: Vec<rv_proto::TopicKeyPublicBundle>,
}

struct ServerTopic {
    record: TopicRecord,
    chain_index: u32,
    /// `topic_id` (12 bytes) until the first update lands, a 32-byte
    /// SHA-256 digest thereafter — identical seeding to the client's
    /// `Topic::verified_output` so both sides fold the same chain.
    verified_output: Vec<u8>,
    files: HashMap<[u8; 12], Vec<u8>>,
}

struct MockState {
    admin_token: [u8; 16],
    allow_list: HashMap<String, (u32, chrono::DateTime<Utc>)>,
    users: HashMap<SigningPublicKey, ServerUser>,
    devices: HashMap<SigningPublicKey, ServerDevice>,
    topics: HashMap<[u8; 12], ServerTopic>,
}

impl MockState {
    fn empty() -> Self {
        Self {
            admin_token: [0u8; constants::AUTH_TOKEN_LEN],
            allow_list: HashMap::new(),
            users: HashMap::new(),
            devices: HashMap::new(),
            topics: HashMap::new(),
        }
    }
}

/// Full in-memory fake of the Rendezvous server.
pub struct MockServer {
    state: Mutex<MockState>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    pub fn new() -> Self {
        Self { state: Mutex::new(MockState::empty()) }
    }

    fn random_token() -> [u8; constants::AUTH_TOKEN_LEN] {
        let mut out = [0u8; constants::AUTH_TOKEN_LEN];
        rand::rngs::OsRng.fill_bytes(&mut out);
        out
    }
}

fn header<'a>(req: &'a Request, name: &str) -> Result<&'a str, Error> {
    req.headers
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidRequest(format!("missing `{name}` header")))
}

fn decode_key(b64: &str) -> Result<SigningPublicKey, Error> {
    SigningPublicKey::from_b64(b64)
}

fn json_body<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(value).map_err(Into::into)
}

fn parse_json<T: serde::de::DeserializeOwned>(body: Option<Vec<u8>>) -> Result<T, Error> {
    let bytes = body.ok_or(Error::NoDataInResponse)?;
    serde_json::from_slice(&bytes).map_err(Into::into)
}

impl MockState {
    fn authenticate_admin(&self, req: &Request) -> Result<(), Error> {
        let auth = header(req, HEADER_AUTH)?;
        let token = URL_SAFE_NO_PAD
            .decode(auth)
            .map_err(|e| Error::InvalidRequest(format!("bad auth header: {e}")))?;
        if token != self.admin_token {
            return Err(Error::AuthenticationFailed);
        }
        Ok(())
    }

    fn authenticate_device(&self, req: &Request) -> Result<SigningPublicKey, Error> {
        let device_b64 = header(req, HEADER_DEVICE)?;
        let device_key = decode_key(device_b64)?;
        let auth = header(req, HEADER_AUTH)?;
        let token_bytes = URL_SAFE_NO_PAD
            .decode(auth)
            .map_err(|e| Error::InvalidRequest(format!("bad auth header: {e}")))?;
        let device = self
            .devices
            .get(&device_key)
            .ok_or(Error::AuthenticationFailed)?;
        if device.auth_token[..] != token_bytes[..] {
            return Err(Error::AuthenticationFailed);
        }
        Ok(device_key)
    }

    fn inbox_push_topic_update(&mut self, member_user: &SigningPublicKey, record: &TopicRecord, except: Option<&SigningPublicKey>) {
        for (device_key, device) in self.devices.iter_mut() {
            if device.user_key == *member_user && Some(device_key) != except {
                device.inbox.topic_updates.push(record.clone());
            }
        }
    }

    fn inbox_push_message(&mut self, member_user: &SigningPublicKey, update: &rv_proto::IncomingUpdate, except: Option<&SigningPublicKey>) {
        for (device_key, device) in self.devices.iter_mut() {
            if device.user_key == *member_user && Some(device_key) != except {
                device.inbox.messages.push(update.clone());
            }
        }
    }
}

#[async_trait]
impl ServerTransport for MockServer {
    async fn call(&self, method: Method, path: &str, request: Request) -> Result<Option<Vec<u8>>, Error> {
        let mut state = self.state.lock().expect("mock server mutex poisoned");
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match (method, segments.as_slice()) {
            (Method::Get, ["ping"]) => Ok(None),

            (Method::Get, ["admin", "renew"]) => {
                state.authenticate_admin(&request)?;
                state.admin_token = MockServer::random_token();
                Ok(Some(state.admin_token.to_vec()))
            }

            (Method::Get, ["admin", "reset"]) => {
                state.authenticate_admin(&request)?;
                *state = MockState::empty();
                Ok(None)
            }

            (Method::Post, ["user", "allow"]) => {
                state.authenticate_admin(&request)?;
                let username = header(&request, HEADER_USERNAME)?.to_string();
                let pin = rand::rngs::OsRng.next_u32() % constants::PIN_MAX;
                let expiry = Utc::now() + ChronoDuration::seconds(constants::PIN_EXPIRY_SECS);
                state.allow_list.insert(username, (pin, expiry));
                Ok(Some(json_body(&AllowedUser { pin, expiry })?))
            }

            (Method::Post, ["user", "register"]) => {
                let bundle: RegistrationBundle = parse_json(request.body)?;
                let (expected_pin, _expiry) = state
                    .allow_list
                    .get(&bundle.user_info.name)
                    .copied()
                    .ok_or(Error::AuthenticationFailed)?;
                if expected_pin != bundle.pin {
                    return Err(Error::AuthenticationFailed);
                }
                if state.users.contains_key(&bundle.user_info.user_public_key) {
                    return Err(Error::ResourceAlreadyExists);
                }
                state.allow_list.remove(&bundle.user_info.name);

                let device_record = bundle
                    .user_info
                    .devices
                    .first()
                    .ok_or_else(|| Error::InvalidRequest("registration carries no device".into()))?
                    .clone();
                let token = MockServer::random_token();
                state.devices.insert(
                    device_record.device_public_key,
                    ServerDevice {
                        user_key: bundle.user_info.user_public_key,
                        auth_token: token,
                        prekeys: bundle.prekeys.into_iter().collect(),
                        inbox: DeviceInbox::default(),
                    },
                );
                state.users.insert(
                    bundle.user_info.user_public_key,
                    ServerUser { info: bundle.user_info, topic_key_pool: bundle.topic_keys },
                );
                Ok(Some(json_body(&RegistrationResult { auth_token: token })?))
            }

            (Method::Post, ["device", "prekeys"]) => {
                let device_key = state.authenticate_device(&request)?;
                let upload: PrekeyUploadRequest = parse_json(request.body)?;
                let device = state.devices.get_mut(&device_key).expect("authenticated device must exist");
                device.prekeys.extend(upload.prekeys);
                Ok(None)
            }

            (Method::Get, ["user", "prekeys"]) => {
                let device_key = state.authenticate_device(&request)?;
                let count: usize = header(&request, HEADER_COUNT)?
                    .parse()
                    .map_err(|_| Error::InvalidRequest("bad count header".into()))?;
                let _app = header(&request, HEADER_APP)?;
                let user_key = state.devices[&device_key].user_key;
                let other_device_keys: Vec<SigningPublicKey> = state.users[&user_key]
                    .info
                    .devices
                    .iter()
                    .map(|d| d.device_public_key)
                    .filter(|k| *k != device_key)
                    .collect();

                let mut devices = Vec::new();
                for other in other_device_keys {
                    let Some(dev) = state.devices.get_mut(&other) else { continue };
                    let take = count.min(dev.prekeys.len());
                    let prekeys: Vec<SignedPrekey> = dev.prekeys.drain(..take).collect();
                    devices.push(PerDevicePrekeys { device_key: other, prekeys });
                }
                Ok(Some(json_body(&DevicePrekeyBundle { key_count: count as u32, devices })?))
            }

            (Method::Post, ["user", "topickeys"]) => {
                let device_key = state.authenticate_device(&request)?;
                let bundle: TopicKeyBundle = parse_json(request.body)?;
                let user_key = state.devices[&device_key].user_key;
                state.users.get_mut(&user_key).expect("authenticated user must exist").topic_key_pool.extend(bundle.topic_keys);
                for per_device in bundle.messages {
                    if let Some(dev) = state.devices.get_mut(&per_device.device_key) {
                        dev.inbox.topic_key_messages.extend(per_device.messages);
                    }
                }
                Ok(None)
            }

            (Method::Post, ["users", "topickey"]) => {
                state.authenticate_device(&request)?;
                let req: TopicKeyRequest = parse_json(request.body)?;
                let mut keys = Vec::new();
                for user_key in req.user_keys {
                    if let Some(user) = state.users.get_mut(&user_key) {
                        if !user.topic_key_pool.is_empty() {
                            keys.push(user.topic_key_pool.remove(0));
                        }
                    }
                }
                Ok(Some(json_body(&TopicKeyResponse { keys })?))
            }

            (Method::Get, ["user", "topickey"]) => {
                state.authenticate_device(&request)?;
                let receiver = decode_key(header(&request, HEADER_RECEIVER)?)?;
                let _app = header(&request, HEADER_APP)?;
                let user = state.users.get_mut(&receiver).ok_or(Error::NoDataInResponse)?;
                if user.topic_key_pool.is_empty() {
                    return Err(Error::NoDataInResponse);
                }
                let bundle = user.topic_key_pool.remove(0);
                Ok(Some(json_body(&bundle)?))
            }

            (Method::Post, ["topic", "create"]) => {
                let device_key = state.authenticate_device(&request)?;
                let record: TopicRecord = parse_json(request.body)?;
                if state.topics.contains_key(&record.topic_id) {
                    return Err(Error::ResourceAlreadyExists);
                }
                let verified_output = record.topic_id.to_vec();
                for member in &record.members {
                    state.inbox_push_topic_update(&member.user_key, &record, Some(&device_key));
                }
                state.topics.insert(
                    record.topic_id,
                    ServerTopic { record, chain_index: 0, verified_output, files: HashMap::new() },
                );
                Ok(None)
            }

            (Method::Post, ["topic", "message", topic_id_b64]) => {
                let device_key = state.authenticate_device(&request)?;
                let topic_id = decode_topic_id(topic_id_b64)?;
                let payload: TopicMessageRequest = parse_json(request.body)?;

                let topic = state.topics.get_mut(&topic_id).ok_or(Error::InvalidRequest("unknown topic".into()))?;
                let sender_member = topic
                    .record
                    .members
                    .get(payload.upload.sender_index as usize)
                    .ok_or(Error::InvalidRequest("sender index out of bounds".into()))?
                    .clone();
                let update_signature = rv_crypto::decode_signature(&payload.upload.signature)?;
                rv_crypto::verify(&sender_member.signature_key, &payload.upload.canonical_bytes(), &update_signature)
                    .map_err(|_| Error::InvalidSignature("update signature".into()))?;

                let output = rv_crypto::fold_chain(&topic.verified_output, &update_signature);
                let chain_index = topic.chain_index + 1;
                topic.chain_index = chain_index;
                topic.verified_output = output.to_vec();
                for part in &payload.file_payloads {
                    topic.files.insert(part.id, part.ciphertext.clone());
                }

                let incoming = rv_proto::IncomingUpdate {
                    topic_id,
                    chain_index,
                    output,
                    sender_index: payload.upload.sender_index,
                    metadata: payload.upload.metadata,
                    files: payload.upload.files,
                    signature: payload.upload.signature,
                };
                let members: Vec<SigningPublicKey> = topic.record.members.iter().map(|m| m.user_key).collect();
                for member_user in members {
                    state.inbox_push_message(&member_user, &incoming, Some(&device_key));
                }
                Ok(Some(json_body(&ChainState { chain_index, output })?))
            }

            (Method::Post, ["topic", "receipt"]) => {
                let device_key = state.authenticate_device(&request)?;
                let receipt: Receipt = parse_json(request.body)?;
                let Some(topic) = state.topics.get(&receipt.topic_id) else {
                    return Err(Error::InvalidRequest("unknown topic".into()));
                };
                let members: Vec<SigningPublicKey> = topic.record.members.iter().map(|m| m.user_key).collect();
                for member_user in members {
                    state.inbox_push_receipt(&member_user, &receipt, Some(&device_key));
                }
                Ok(None)
            }

            (Method::Get, ["device", "messages"]) => {
                let device_key = state.authenticate_device(&request)?;
                let device = state.devices.get_mut(&device_key).expect("authenticated device must exist");
                let download = DeviceDownload {
                    user_info: device.inbox.user_info.take(),
                    topic_key_messages: std::mem::take(&mut device.inbox.topic_key_messages),
                    topic_updates: std::mem::take(&mut device.inbox.topic_updates),
                    messages: std::mem::take(&mut device.inbox.messages),
                    receipts: std::mem::take(&mut device.inbox.receipts),
                };
                Ok(Some(json_body(&download)?))
            }

            (Method::Get, ["files", topic_id_b64, file_id_b64]) => {
                state.authenticate_device(&request)?;
                let topic_id = decode_topic_id(topic_id_b64)?;
                let file_id = decode_topic_id(file_id_b64)?;
                let topic = state.topics.get(&topic_id).ok_or(Error::InvalidFile("unknown topic".into()))?;
                let ciphertext = topic.files.get(&file_id).ok_or(Error::InvalidFile("unknown file".into()))?;
                Ok(Some(ciphertext.clone()))
            }

            _ => Err(Error::InvalidRequest(format!("unroutable request: {path}"))),
        }
    }
}

impl MockState {
    fn inbox_push_receipt(&mut self, member_user: &SigningPublicKey, receipt: &Receipt, except: Option<&SigningPublicKey>) {
        for (device_key, device) in self.devices.iter_mut() {
            if device.user_key == *member_user && Some(device_key) != except {
                device.inbox.receipts.push(receipt.clone());
            }
        }
    }
}

fn decode_topic_id(b64: &str) -> Result<[u8; 12], Error> {
    let raw = URL_SAFE_NO_PAD
        .decode(b64)
        .map_err(|e| Error::InvalidRequest(format!("bad id in path: {e}")))?;
    raw.try_into().map_err(|_| Error::InvalidRequest("id must be 12 bytes".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_succeeds_without_auth() {
        let server = MockServer::new();
        let result = server.call(Method::Get, "ping", Request::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn admin_renew_rejects_wrong_token() {
        let server = MockServer::new();
        let req = Request::new().header(HEADER_AUTH, URL_SAFE_NO_PAD.encode([0xAAu8; 16]));
        let result = server.call(Method::Get, "admin/renew", req).await;
        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn admin_renew_rotates_token_with_zero_start() {
        let server = MockServer::new();
        let req = Request::new().header(HEADER_AUTH, URL_SAFE_NO_PAD.encode([0u8; 16]));
        let first = server.call(Method::Get, "admin/renew", req).await.unwrap().unwrap();
        let new_token_b64 = URL_SAFE_NO_PAD.encode(&first);
        let req2 = Request::new().header(HEADER_AUTH, new_token_b64);
        let second = server.call(Method::Get, "admin/renew", req2).await;
        assert!(second.is_ok());
    }
}
