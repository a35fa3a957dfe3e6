//! The `Device` orchestrator — the single concrete type this crate
//! exposes. The distinct `User`/`Device: User`/`Device: Server` layering
//! of an earlier design collapses into one type here.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;

use rv_crypto::{AgreementPrivateKey, AgreementPublicKey, SigningPrivateKey, SigningPublicKey};
use rv_error::Error;
use rv_proto::{
    ChainState, DeviceDownload, DevicePrekeyBundle, DeviceRecord, DeviceTopicKeyMessages, FileDescriptor,
    FilePayload, IncomingUpdate, PerDevicePrekeys, PrekeyUploadRequest, Receipt, RegistrationBundle,
    RegistrationResult, Role, SignedPrekey, TopicKeyBundle, TopicKeyMessage, TopicKeyPublicBundle,
    TopicKeyRequest, TopicKeyResponse, TopicMember, TopicMessageRequest, TopicRecord, Update, UpdateUpload,
    UserInfo,
};
use rv_transport::constants::{HEADER_APP, HEADER_AUTH, HEADER_COUNT, HEADER_DEVICE, HEADER_RECEIVER, MAX_METADATA_LEN};
use rv_transport::{call_empty, call_json, Method, Request, ServerTransport};

use crate::config::ClientConfig;
use crate::events::{DeviceEvent, EventHandler};
use crate::persistence::{ClientData, StoredPrekey, StoredTopic, StoredTopicKeys, StoredUpdate};
use crate::topic_keys::TopicKeys;
use crate::topic_state::{Delivered, LateOutcome, Topic};

/// A single device belonging to a single user. Owns the prekey store,
/// topic-key pool, topic table, and user info — resources owned by the
/// device and mutated only through its `&mut self` methods.
pub struct Device {
    config: ClientConfig,
    transport: Arc<dyn ServerTransport>,
    user_priv: SigningPrivateKey,
    device_priv: SigningPrivateKey,
    user_info: UserInfo,
    auth_token: [u8; 16],
    /// This device's own published, unconsumed prekeys, keyed by public
    /// half; consumed entries are removed on ingestion.
    prekeys: HashMap<AgreementPublicKey, AgreementPrivateKey>,
    topic_keys_pool: Vec<TopicKeys>,
    topics: HashMap<[u8; 12], Topic>,
    event_handler: Option<EventHandler>,
}

impl Device {
    fn device_request(&self) -> Request {
        Request::new()
            .header(HEADER_DEVICE, self.device_priv.public().to_b64())
            .header(HEADER_AUTH, URL_SAFE_NO_PAD.encode(self.auth_token))
    }

    fn emit(&mut self, event: DeviceEvent) {
        if let Some(handler) = self.event_handler.as_mut() {
            handler(event);
        }
    }

    pub fn set_event_handler(&mut self, handler: EventHandler) {
        self.event_handler = Some(handler);
    }

    pub fn user_info(&self) -> &UserInfo {
        &self.user_info
    }

    pub fn auth_token(&self) -> [u8; 16] {
        self.auth_token
    }

    pub fn user_public_key(&self) -> SigningPublicKey {
        self.user_priv.public()
    }

    pub fn device_public_key(&self) -> SigningPublicKey {
        self.device_priv.public()
    }

    pub fn topic(&self, topic_id: &[u8; 12]) -> Option<&Topic> {
        self.topics.get(topic_id)
    }

    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics.values()
    }

    // ── Registration ──────────────────────────────────────────────────

    /// Generates a fresh user/device identity, an initial batch of
    /// prekeys and topic keys, and registers in one round trip.
    pub async fn register(
        transport: Arc<dyn ServerTransport>,
        config: ClientConfig,
        name: String,
        pin: u32,
        initial_prekeys: usize,
        initial_topic_keys: usize,
    ) -> Result<Self, Error> {
        tracing::info!(%name, initial_prekeys, initial_topic_keys, "registering new device");
        let user_priv = SigningPrivateKey::generate();
        let device_priv = SigningPrivateKey::generate();
        let now = Utc::now();

        let device_record = DeviceRecord {
            device_public_key: device_priv.public(),
            creation_time: now,
            is_active: true,
            app_id: config.app_id.clone(),
        };
        let mut user_info = UserInfo {
            user_public_key: user_priv.public(),
            name,
            creation_time: now,
            timestamp: now,
            devices: vec![device_record],
            signature: String::new(),
        };
        let signature = rv_crypto::sign(&user_priv, &user_info.canonical_bytes());
        user_info.signature = URL_SAFE_NO_PAD.encode(signature);

        let mut prekeys = Vec::with_capacity(initial_prekeys);
        let mut signed_prekeys = Vec::with_capacity(initial_prekeys);
        for _ in 0..initial_prekeys {
            let priv_key = AgreementPrivateKey::generate();
            let prekey_signature = device_priv.sign(priv_key.public().as_bytes());
            signed_prekeys.push(SignedPrekey { public: priv_key.public(), signature: rv_crypto::encode_signature(&prekey_signature) });
            prekeys.push(priv_key);
        }

        let topic_keys: Vec<TopicKeys> = (0..initial_topic_keys).map(|_| TopicKeys::new(&user_priv)).collect();
        let topic_key_bundles: Vec<TopicKeyPublicBundle> = topic_keys.iter().map(|k| k.bundle.clone()).collect();

        let bundle = RegistrationBundle {
            user_info: user_info.clone(),
            pin,
            prekeys: signed_prekeys,
            topic_keys: topic_key_bundles,
        };
        let request = Request::new().json_body(&bundle)?;
        let result: RegistrationResult = call_json(transport.as_ref(), Method::Post, "user/register", request)
            .await
            .map_err(|e| {
                tracing::error!(%name, error = %e, "registration failed");
                e
            })?;
        tracing::info!(user_key = %user_priv.public().to_b64(), "registration succeeded");

        let mut prekey_map = HashMap::new();
        for p in prekeys {
            prekey_map.insert(p.public(), p);
        }

        Ok(Self {
            config,
            transport,
            user_priv,
            device_priv,
            user_info,
            auth_token: result.auth_token,
            prekeys: prekey_map,
            topic_keys_pool: topic_keys,
            topics: HashMap::new(),
            event_handler: None,
        })
    }

    // ── Prekeys and topic keys ──────────────────────────────────────

    pub async fn upload_prekeys(&mut self, count: usize) -> Result<(), Error> {
        tracing::info!(count, "uploading prekeys");
        let mut new_keys = Vec::with_capacity(count);
        let mut signed = Vec::with_capacity(count);
        for _ in 0..count {
            let priv_key = AgreementPrivateKey::generate();
            let signature = self.device_priv.sign(priv_key.public().as_bytes());
            signed.push(SignedPrekey { public: priv_key.public(), signature: rv_crypto::encode_signature(&signature) });
            new_keys.push(priv_key);
        }
        let request = self.device_request().json_body(&PrekeyUploadRequest { prekeys: signed })?;
        if let Err(e) = call_empty(self.transport.as_ref(), Method::Post, "device/prekeys", request).await {
            tracing::warn!(error = %e, "prekey upload failed");
            return Err(e);
        }
        for key in new_keys {
            self.prekeys.insert(key.public(), key);
        }
        Ok(())
    }

    /// Fetches a prekey bundle for every other device, verifies the four
    /// local preconditions, mints `key_count` fresh topic keys, and
    /// delivers one per peer prekey.
    pub async fn upload_topic_keys(&mut self, count: usize) -> Result<(), Error> {
        tracing::info!(count, "distributing topic keys to other devices");
        let request = self
            .device_request()
            .header(HEADER_COUNT, count.to_string())
            .header(HEADER_APP, self.config.app_id.clone());
        let bundle: DevicePrekeyBundle = call_json(self.transport.as_ref(), Method::Get, "user/prekeys", request)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "fetching peer-device prekey bundle failed");
                e
            })?;

        let own_device_key = self.device_priv.public();
        let other_device_keys: Vec<SigningPublicKey> = self
            .user_info
            .devices
            .iter()
            .map(|d| d.device_public_key)
            .filter(|key| *key != own_device_key)
            .collect();

        for per_device in &bundle.devices {
            if !other_device_keys.contains(&per_device.device_key) {
                return Err(Error::InvalidServerData("prekey bundle names a device outside UserInfo".into()));
            }
            if per_device.prekeys.len() as u32 != bundle.key_count {
                return Err(Error::InvalidServerData("per-device prekey count does not match key_count".into()));
            }
            for prekey in &per_device.prekeys {
                let signature = rv_crypto::decode_signature(&prekey.signature)?;
                rv_crypto::verify(&per_device.device_key, prekey.public.as_bytes(), &signature)
                    .map_err(|_| Error::InvalidSignature("prekey signature".into()))?;
            }
        }
        let returned: std::collections::HashSet<SigningPublicKey> = bundle.devices.iter().map(|d| d.device_key).collect();
        for other in &other_device_keys {
            if !returned.contains(other) {
                return Err(Error::InvalidServerData("missing prekey bundle for a known device".into()));
            }
        }

        let generated: Vec<TopicKeys> = (0..bundle.key_count).map(|_| TopicKeys::new(&self.user_priv)).collect();
        let topic_key_bundles: Vec<TopicKeyPublicBundle> = generated.iter().map(|k| k.bundle.clone()).collect();

        let mut messages = Vec::with_capacity(bundle.devices.len());
        for per_device in &bundle.devices {
            let mut device_messages = Vec::with_capacity(per_device.prekeys.len());
            for (index, prekey) in per_device.prekeys.iter().enumerate() {
                device_messages.push(generated[index].wrap_for(&prekey.public)?);
            }
            messages.push(DeviceTopicKeyMessages { device_key: per_device.device_key, messages: device_messages });
        }

        let upload = TopicKeyBundle { topic_keys: topic_key_bundles, messages };
        let request = self.device_request().json_body(&upload)?;
        call_empty(self.transport.as_ref(), Method::Post, "user/topickeys", request)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "topic key upload failed");
                e
            })?;
        tracing::info!(generated = generated.len(), "topic keys distributed");

        self.topic_keys_pool.extend(generated);
        Ok(())
    }

    pub async fn fetch_single_topic_key(&self, receiver: SigningPublicKey) -> Result<TopicKeyPublicBundle, Error> {
        tracing::info!(receiver = %receiver.to_b64(), "fetching a single topic key");
        let request = self
            .device_request()
            .header(HEADER_RECEIVER, receiver.to_b64())
            .header(HEADER_APP, self.config.app_id.clone());
        call_json(self.transport.as_ref(), Method::Get, "user/topickey", request).await
    }

    // ── Topics ───────────────────────────────────────────────────────

    /// Creates a topic containing the caller (as `Role::Admin`) plus
    /// `members`. Members whose topic key pool is empty server-side are
    /// silently dropped.
    pub async fn create_topic(&mut self, members: &[(SigningPublicKey, Role)]) -> Result<[u8; 12], Error> {
        tracing::info!(requested_members = members.len(), "creating topic");
        let own_keys = self
            .topic_keys_pool
            .pop()
            .ok_or_else(|| Error::InvalidRequest("no unused topic key available".into()))?;

        let user_keys: Vec<SigningPublicKey> = members.iter().map(|(key, _)| *key).collect();
        let request = self.device_request().json_body(&TopicKeyRequest { user_keys })?;
        let response: TopicKeyResponse = call_json(self.transport.as_ref(), Method::Post, "users/topickey", request).await?;

        let message_key = rv_crypto::aead::random_array::<32>();
        let topic_id = rv_crypto::aead::random_array::<12>();
        let now = Utc::now();

        let mut topic_members = vec![TopicMember {
            user_key: self.user_priv.public(),
            signature_key: own_keys.bundle.signature_key,
            encryption_key: own_keys.bundle.encryption_key,
            role: Role::Admin,
            encrypted_message_key: rv_crypto::encrypt_to(&own_keys.bundle.encryption_key, &message_key)?,
            signature: own_keys.bundle.signature.clone(),
        }];

        for (user_key, role) in members {
            let Some(bundle) = response.keys.iter().find(|b| b.user_key == *user_key) else { continue };
            let bundle_signature = rv_crypto::decode_signature(&bundle.signature)?;
            rv_crypto::verify(&bundle.user_key, &bundle.signed_bytes(), &bundle_signature)
                .map_err(|_| Error::InvalidSignature("topic key bundle signature".into()))?;
            topic_members.push(TopicMember {
                user_key: bundle.user_key,
                signature_key: bundle.signature_key,
                encryption_key: bundle.encryption_key,
                role: *role,
                encrypted_message_key: rv_crypto::encrypt_to(&bundle.encryption_key, &message_key)?,
                signature: bundle.signature.clone(),
            });
        }

        let mut record = TopicRecord { topic_id, creation_time: now, timestamp: now, members: topic_members, signature: String::new() };
        record.signature = rv_crypto::encode_signature(&rv_crypto::sign(&own_keys.signing_priv, &record.canonical_bytes()));

        let request = self.device_request().json_body(&record)?;
        call_empty(self.transport.as_ref(), Method::Post, "topic/create", request)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "topic create request failed");
                e
            })?;
        tracing::info!(topic_id = %URL_SAFE_NO_PAD.encode(topic_id), members = record.members.len(), "topic created");

        let topic = Topic {
            topic_id,
            creation_time: now,
            timestamp: now,
            members: record.members,
            message_key,
            signing_priv: own_keys.signing_priv,
            enc_priv: own_keys.enc_priv,
            chain_index: 0,
            verified_output: topic_id.to_vec(),
            unverified_updates: vec![],
        };
        self.topics.insert(topic_id, topic);
        self.emit(DeviceEvent::TopicAdded { topic_id });
        Ok(topic_id)
    }

    /// Local topic state is not mutated on send — the returned
    /// `ChainState` is authoritative only after the next
    /// `get_messages`/push delivers it back as an `IncomingUpdate`.
    pub async fn upload(&self, topic_id: [u8; 12], files: &[([u8; 12], Vec<u8>)], metadata: &[u8]) -> Result<ChainState, Error> {
        tracing::info!(topic_id = %URL_SAFE_NO_PAD.encode(topic_id), files = files.len(), "uploading update");
        let topic = self.topics.get(&topic_id).ok_or_else(|| Error::InvalidRequest("unknown topic".into()))?;
        let sender_index = topic.own_member_index().ok_or_else(|| Error::InvalidRequest("not a member of this topic".into()))?;
        if matches!(topic.own_role(), Some(Role::Observer)) {
            return Err(Error::NoPermissionToWrite);
        }
        if metadata.len() > MAX_METADATA_LEN {
            return Err(Error::InvalidRequest("metadata exceeds max length".into()));
        }

        let mut file_descriptors = Vec::with_capacity(files.len());
        let mut file_payloads = Vec::with_capacity(files.len());
        for (id, data) in files {
            let sealed = rv_crypto::aead::seal_gcm(&topic.message_key, data, Some(*id))?;
            let hash = rv_crypto::sha256(&sealed.ciphertext);
            file_descriptors.push(FileDescriptor { id: *id, tag: sealed.tag, hash });
            file_payloads.push(FilePayload { id: *id, ciphertext: sealed.ciphertext });
        }
        let encrypted_metadata = rv_crypto::seal_combined(&topic.message_key, metadata, None)?;

        let mut upload = UpdateUpload { sender_index: sender_index as u32, metadata: encrypted_metadata, files: file_descriptors, signature: String::new() };
        upload.signature = rv_crypto::encode_signature(&rv_crypto::sign(&topic.signing_priv, &upload.canonical_bytes()));

        let body = TopicMessageRequest { upload, file_payloads };
        let request = self.device_request().json_body(&body)?;
        let path = format!("topic/message/{}", URL_SAFE_NO_PAD.encode(topic_id));
        let chain_state = call_json(self.transport.as_ref(), Method::Post, &path, request)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "update upload failed");
                e
            })?;
        tracing::info!(?chain_state, "update uploaded");
        Ok(chain_state)
    }

    pub async fn get_file(&self, topic_id: [u8; 12], file: &FileDescriptor) -> Result<Vec<u8>, Error> {
        tracing::info!(topic_id = %URL_SAFE_NO_PAD.encode(topic_id), file_id = %URL_SAFE_NO_PAD.encode(file.id), "fetching file");
        let topic = self.topics.get(&topic_id).ok_or_else(|| Error::InvalidRequest("unknown topic".into()))?;
        let path = format!("files/{}/{}", URL_SAFE_NO_PAD.encode(topic_id), URL_SAFE_NO_PAD.encode(file.id));
        let ciphertext = self
            .transport
            .call(Method::Get, &path, self.device_request())
            .await?
            .ok_or(Error::NoDataInResponse)?;
        if rv_crypto::sha256(&ciphertext) != file.hash {
            tracing::warn!(file_id = %URL_SAFE_NO_PAD.encode(file.id), "file hash mismatch");
            return Err(Error::InvalidFile("hash mismatch".into()));
        }
        rv_crypto::open_gcm(&topic.message_key, &rv_crypto::Sealed { nonce: file.id, ciphertext, tag: file.tag }).map_err(|_| {
            tracing::warn!(file_id = %URL_SAFE_NO_PAD.encode(file.id), "file GCM authentication failed");
            Error::InvalidFile("GCM authentication failed".into())
        })
    }

    pub async fn send_receipt(&self, topic_id: [u8; 12], chain_index: u32) -> Result<(), Error> {
        tracing::info!(topic_id = %URL_SAFE_NO_PAD.encode(topic_id), chain_index, "sending receipt");
        let receipt = Receipt { topic_id, chain_index, sender: self.user_priv.public().as_bytes().to_vec() };
        let request = self.device_request().json_body(&receipt)?;
        call_empty(self.transport.as_ref(), Method::Post, "topic/receipt", request).await
    }

    // ── Receive pipeline ────────────────────────────────────────────

    /// Pulls and processes one batch from `device/messages`, in strict
    /// sub-phase order.
    pub async fn get_messages(&mut self) -> Result<(), Error> {
        tracing::info!("polling device/messages");
        let request = self.device_request();
        let download: DeviceDownload = call_json(self.transport.as_ref(), Method::Get, "device/messages", request)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "device/messages poll failed");
                e
            })?;
        self.process_download(download)
    }

    fn process_download(&mut self, download: DeviceDownload) -> Result<(), Error> {
        tracing::info!(
            topic_key_messages = download.topic_key_messages.len(),
            topic_updates = download.topic_updates.len(),
            messages = download.messages.len(),
            receipts = download.receipts.len(),
            "processing download batch"
        );
        if let Some(info) = download.user_info {
            self.merge_user_info(info)?;
        }
        for message in download.topic_key_messages {
            self.ingest_topic_key_message(message)?;
        }
        for record in download.topic_updates {
            self.ingest_topic_record(record)?;
        }
        for update in download.messages {
            self.ingest_content_update(update)?;
        }
        for receipt in download.receipts {
            self.ingest_receipt(receipt);
        }
        Ok(())
    }

    /// One of the three push entry points: a topic-key delivery pushed
    /// outside a `device/messages` batch.
    pub fn receive_topic_key_message_push(&mut self, payload: &[u8]) -> Result<(), Error> {
        tracing::info!("dispatching pushed topic key message");
        let message: TopicKeyMessage = serde_json::from_slice(payload)?;
        self.ingest_topic_key_message(message)
    }

    pub fn receive_topic_update_push(&mut self, payload: &[u8]) -> Result<(), Error> {
        tracing::info!("dispatching pushed topic update");
        let record: TopicRecord = serde_json::from_slice(payload)?;
        self.ingest_topic_record(record)
    }

    pub fn receive_content_update_push(&mut self, payload: &[u8]) -> Result<(), Error> {
        tracing::info!("dispatching pushed content update");
        let update: IncomingUpdate = serde_json::from_slice(payload)?;
        self.ingest_content_update(update)
    }

    /// Merges an incoming `UserInfo`. Stale (non-increasing timestamp)
    /// records are ignored silently; signature or immutable-field
    /// violations abort the batch (`invalid_server_data` is batch-fatal).
    fn merge_user_info(&mut self, incoming: UserInfo) -> Result<(), Error> {
        if incoming.user_public_key != self.user_priv.public() {
            tracing::error!("UserInfo update named the wrong user, aborting batch");
            return Err(Error::InvalidServerData("UserInfo for the wrong user".into()));
        }
        if incoming.timestamp <= self.user_info.timestamp {
            tracing::info!("ignoring stale UserInfo update");
            return Ok(());
        }
        if incoming.creation_time != self.user_info.creation_time || incoming.name != self.user_info.name {
            tracing::error!("UserInfo immutable fields changed, aborting batch");
            return Err(Error::InvalidServerData("UserInfo immutable fields changed".into()));
        }
        if !incoming.devices.windows(2).all(|pair| pair[0].creation_time <= pair[1].creation_time) {
            tracing::error!("UserInfo devices not ascending by creation_time, aborting batch");
            return Err(Error::InvalidServerData("UserInfo devices not ascending by creation_time".into()));
        }
        let signature_bytes = URL_SAFE_NO_PAD
            .decode(&incoming.signature)
            .map_err(|e| Error::InvalidServerData(format!("bad UserInfo signature encoding: {e}")))?;
        rv_crypto::verify(&incoming.user_public_key, &incoming.canonical_bytes(), &signature_bytes).map_err(|_| {
            tracing::error!("UserInfo signature invalid, aborting batch");
            Error::InvalidServerData("UserInfo signature invalid".into())
        })?;
        tracing::info!(devices = incoming.devices.len(), "UserInfo merged");

        let diffs = diff_devices(&self.user_info.devices, &incoming.devices);
        self.user_info = incoming;
        for diff in diffs {
            match diff {
                rv_proto::DeviceDiff::Added(record) => self.emit(DeviceEvent::UserDeviceAdded(record)),
                rv_proto::DeviceDiff::Changed(record) => self.emit(DeviceEvent::UserDeviceChanged(record)),
                rv_proto::DeviceDiff::Removed(key) => self.emit(DeviceEvent::UserDeviceRemoved(key)),
            }
        }
        Ok(())
    }

    /// Recovers a topic key delivered by another of this user's own
    /// devices, consuming the prekey it was wrapped under.
    fn ingest_topic_key_message(&mut self, message: TopicKeyMessage) -> Result<(), Error> {
        let prekey_priv = self
            .prekeys
            .remove(&message.device_prekey)
            .ok_or_else(|| Error::Unknown("topic key message names an unknown prekey".into()))?;
        let own_user_key = self.user_priv.public();
        let keys = TopicKeys::accept(&message, &prekey_priv, &own_user_key)?;
        self.topic_keys_pool.push(keys);
        Ok(())
    }

    /// Ingests a topic's signed membership record, either new or an
    /// update to one already held.
    fn ingest_topic_record(&mut self, record: TopicRecord) -> Result<(), Error> {
        let creator = record
            .members
            .first()
            .ok_or_else(|| Error::InvalidServerData("topic record has no members".into()))?;
        let record_signature = rv_crypto::decode_signature(&record.signature)?;
        rv_crypto::verify(&creator.signature_key, &record.canonical_bytes(), &record_signature)
            .map_err(|_| Error::InvalidServerData("topic record signature invalid".into()))?;

        // Per-member binding: Verify(user_key, signature, signature_key ‖ encryption_key) — §3, §8.5.
        for member in &record.members {
            let binding_signature = rv_crypto::decode_signature(&member.signature)?;
            rv_crypto::verify(&member.user_key, &member.binding_bytes(), &binding_signature)
                .map_err(|_| Error::InvalidServerData("topic member key binding signature invalid".into()))?;
        }

        if let Some(topic) = self.topics.get_mut(&record.topic_id) {
            if record.timestamp > topic.timestamp {
                topic.members = record.members;
                topic.timestamp = record.timestamp;
                self.emit(DeviceEvent::TopicUpdated { topic_id: record.topic_id });
            }
            return Ok(());
        }

        let own_user_key = self.user_priv.public();
        let Some(own_member) = record.members.iter().find(|m| m.user_key == own_user_key) else {
            // Not (yet) a member of this topic; nothing to materialize.
            return Ok(());
        };

        let pool_index = self
            .topic_keys_pool
            .iter()
            .position(|k| k.bundle.encryption_key == own_member.encryption_key)
            .ok_or_else(|| Error::Unknown("no topic key available for this admission".into()))?;
        let keys = self.topic_keys_pool.remove(pool_index);

        let message_key_bytes = rv_crypto::decrypt_from(&keys.enc_priv, &own_member.encrypted_message_key)?;
        if message_key_bytes.len() != 32 {
            return Err(Error::InvalidServerData("decrypted message key must be 32 bytes".into()));
        }
        let mut message_key = [0u8; 32];
        message_key.copy_from_slice(&message_key_bytes);

        let topic = Topic {
            topic_id: record.topic_id,
            creation_time: record.creation_time,
            timestamp: record.timestamp,
            members: record.members,
            message_key,
            signing_priv: keys.signing_priv,
            enc_priv: keys.enc_priv,
            chain_index: 0,
            verified_output: record.topic_id.to_vec(),
            unverified_updates: vec![],
        };
        self.topics.insert(record.topic_id, topic);
        self.emit(DeviceEvent::TopicAdded { topic_id: record.topic_id });
        Ok(())
    }

    /// Resolves the sender, verifies the per-update signature, decrypts
    /// metadata, and hands off to the chain reconciliation state machine.
    fn ingest_content_update(&mut self, incoming: IncomingUpdate) -> Result<(), Error> {
        let Some(topic) = self.topics.get_mut(&incoming.topic_id) else {
            tracing::error!(
                topic_id = %URL_SAFE_NO_PAD.encode(incoming.topic_id),
                "content update names an unknown topic, aborting batch"
            );
            return Err(Error::Unknown("content update names an unknown topic".into()));
        };

        let Some(sender_member) = topic.members.get(incoming.sender_index as usize).cloned() else {
            return Err(Error::InvalidServerData("sender index out of bounds".into()));
        };

        let Ok(update_signature) = rv_crypto::decode_signature(&incoming.signature) else {
            self.emit(DeviceEvent::InvalidChain { topic_id: incoming.topic_id, chain_index: incoming.chain_index });
            return Ok(());
        };
        if rv_crypto::verify(&sender_member.signature_key, &incoming.canonical_bytes(), &update_signature).is_err() {
            let chain_index = incoming.chain_index;
            let topic_id = incoming.topic_id;
            self.emit(DeviceEvent::InvalidChain { topic_id, chain_index });
            return Ok(());
        }

        let metadata = rv_crypto::open_combined(&topic.message_key, &incoming.metadata)
            .map_err(|_| Error::InvalidServerData("update metadata failed to decrypt".into()))?;

        let topic_id = incoming.topic_id;
        let update = Update {
            chain_index: incoming.chain_index,
            output: incoming.output,
            metadata,
            files: incoming.files,
            signature: update_signature,
            sender_user_key: sender_member.user_key,
        };

        let (outcome, late) = topic.ingest_update(update);
        self.deliver_content_outcome(topic_id, outcome);
        for item in late {
            self.deliver_late_outcome(topic_id, item);
        }
        Ok(())
    }

    fn deliver_content_outcome(&mut self, topic_id: [u8; 12], outcome: ContentOutcome) {
        match outcome {
            Delivered::Verified(update) => self.emit(DeviceEvent::UpdateReceived { topic_id, update, verified: true }),
            Delivered::Pending(update) => self.emit(DeviceEvent::UpdateReceived { topic_id, update, verified: false }),
            Delivered::Invalid(chain_index) => self.emit(DeviceEvent::InvalidChain { topic_id, chain_index }),
        }
    }

    fn deliver_late_outcome(&mut self, topic_id: [u8; 12], outcome: LateOutcome) {
        match outcome {
            LateOutcome::Verified(update) => self.emit(DeviceEvent::UpdateVerifiedLate { topic_id, update }),
            LateOutcome::Invalid(chain_index) => self.emit(DeviceEvent::InvalidChain { topic_id, chain_index }),
        }
    }

    fn ingest_receipt(&mut self, receipt: Receipt) {
        let Some(sender) = receipt.sender_key() else { return };
        self.emit(DeviceEvent::ChainStateReceived { topic_id: receipt.topic_id, chain_index: receipt.chain_index, sender });
    }

    // ── Persistence ─────────────────────────────────────────────────

    pub fn export_data(&self) -> ClientData {
        ClientData {
            server_url: self.config.server_url.clone(),
            app_id: self.config.app_id.clone(),
            user_priv: *self.user_priv.secret_bytes(),
            device_priv: *self.device_priv.secret_bytes(),
            user_info: self.user_info.clone(),
            auth_token: self.auth_token,
            prekeys: self
                .prekeys
                .values()
                .map(|p| StoredPrekey { public: *p.public().as_bytes(), secret: *p.secret_bytes() })
                .collect(),
            topic_keys_pool: self
                .topic_keys_pool
                .iter()
                .map(|k| StoredTopicKeys {
                    signing_priv: *k.signing_priv.secret_bytes(),
                    enc_priv: *k.enc_priv.secret_bytes(),
                    bundle: k.bundle.clone(),
                })
                .collect(),
            topics: self
                .topics
                .values()
                .map(|t| StoredTopic {
                    topic_id: t.topic_id,
                    creation_time: t.creation_time,
                    timestamp: t.timestamp,
                    members: t.members.clone(),
                    message_key: t.message_key,
                    signing_priv: *t.signing_priv.secret_bytes(),
                    enc_priv: *t.enc_priv.secret_bytes(),
                    chain_index: t.chain_index,
                    verified_output: t.verified_output.clone(),
                    unverified_updates: t
                        .unverified_updates
                        .iter()
                        .map(|u| StoredUpdate {
                            chain_index: u.chain_index,
                            output: u.output,
                            metadata: u.metadata.clone(),
                            files: u.files.clone(),
                            signature: rv_crypto::encode_signature(&u.signature),
                            sender_user_key: u.sender_user_key,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn import_data(transport: Arc<dyn ServerTransport>, data: ClientData) -> Result<Self, Error> {
        let user_priv = SigningPrivateKey::from_bytes(&data.user_priv);
        let device_priv = SigningPrivateKey::from_bytes(&data.device_priv);

        let prekeys = data
            .prekeys
            .into_iter()
            .map(|p| {
                let key = AgreementPrivateKey::from_bytes(&p.secret);
                (key.public(), key)
            })
            .collect();

        let topic_keys_pool = data
            .topic_keys_pool
            .into_iter()
            .map(|k| TopicKeys {
                signing_priv: SigningPrivateKey::from_bytes(&k.signing_priv),
                enc_priv: AgreementPrivateKey::from_bytes(&k.enc_priv),
                bundle: k.bundle,
            })
            .collect();

        let mut topics = HashMap::with_capacity(data.topics.len());
        for t in data.topics {
            let mut unverified_updates = Vec::with_capacity(t.unverified_updates.len());
            for u in t.unverified_updates {
                unverified_updates.push(Update {
                    chain_index: u.chain_index,
                    output: u.output,
                    metadata: u.metadata,
                    files: u.files,
                    signature: rv_crypto::decode_signature(&u.signature)?,
                    sender_user_key: u.sender_user_key,
                });
            }
            let topic = Topic {
                topic_id: t.topic_id,
                creation_time: t.creation_time,
                timestamp: t.timestamp,
                members: t.members,
                message_key: t.message_key,
                signing_priv: SigningPrivateKey::from_bytes(&t.signing_priv),
                enc_priv: AgreementPrivateKey::from_bytes(&t.enc_priv),
                chain_index: t.chain_index,
                verified_output: t.verified_output,
                unverified_updates,
            };
            topics.insert(topic.topic_id, topic);
        }

        Ok(Self {
            config: ClientConfig::new(data.server_url, data.app_id),
            transport,
            user_priv,
            device_priv,
            user_info: data.user_info,
            auth_token: data.auth_token,
            prekeys,
            topic_keys_pool,
            topics,
            event_handler: None,
        })
    }
}

type ContentOutcome = Delivered;

fn diff_devices(old: &[DeviceRecord], new: &[DeviceRecord]) -> Vec<rv_proto::DeviceDiff> {
    use rv_proto::DeviceDiff;
    let mut diffs = Vec::new();
    for record in new {
        match old.iter().find(|o| o.device_public_key == record.device_public_key) {
            None => diffs.push(DeviceDiff::Added(record.clone())),
            Some(existing) if existing.is_active != record.is_active || existing.app_id != record.app_id => {
                diffs.push(DeviceDiff::Changed(record.clone()))
            }
            _ => {}
        }
    }
    for existing in old {
        if !new.iter().any(|record| record.device_public_key == existing.device_public_key) {
            diffs.push(DeviceDiff::Removed(existing.device_public_key));
        }
    }
    diffs
}
