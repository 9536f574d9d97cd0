//! Signaling coordinator tests.
//!
//! Uses in-memory user/channel stores and capture-backed control
//! sessions; media peers are real `RTCPeerConnection`s (no network I/O
//! is needed to construct them or to run the offer/answer exchange).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Config;
use crate::voice::{
    ActiveUserDirectory, ChannelRef, ChannelStore, PeerFactory, PeerRegistry,
    SignalingCoordinator, UserRef, UserStore, VoiceError,
};
use crate::ws::registry::test_support::{attach_session, Captured};
use crate::ws::ControlRegistry;

#[derive(Default)]
struct MemUserStore {
    users: std::sync::Mutex<HashMap<Uuid, UserRef>>,
}

impl MemUserStore {
    fn insert(&self, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.users.lock().unwrap().insert(
            id,
            UserRef {
                id,
                username: username.to_string(),
            },
        );
        id
    }

    fn forget(&self, id: Uuid) {
        self.users.lock().unwrap().remove(&id);
    }
}

#[async_trait]
impl UserStore for MemUserStore {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserRef>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }
}

#[derive(Default)]
struct MemChannelStore {
    channels: std::sync::Mutex<HashMap<Uuid, ChannelRef>>,
}

impl MemChannelStore {
    fn insert(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.channels.lock().unwrap().insert(
            id,
            ChannelRef {
                id,
                name: name.to_string(),
            },
        );
        id
    }
}

#[async_trait]
impl ChannelStore for MemChannelStore {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<ChannelRef>> {
        Ok(self.channels.lock().unwrap().get(&id).cloned())
    }
}

struct Harness {
    control: Arc<ControlRegistry>,
    peers: Arc<PeerRegistry>,
    active: Arc<ActiveUserDirectory>,
    users: Arc<MemUserStore>,
    channels: Arc<MemChannelStore>,
    coordinator: SignalingCoordinator,
}

impl Harness {
    fn new() -> Self {
        let control = Arc::new(ControlRegistry::new());
        let peers = Arc::new(PeerRegistry::new());
        let active = Arc::new(ActiveUserDirectory::new());
        let users = Arc::new(MemUserStore::default());
        let channels = Arc::new(MemChannelStore::default());

        let factory = Arc::new(
            PeerFactory::new(
                &Config::default_for_test(),
                control.clone(),
                peers.clone(),
                active.clone(),
            )
            .expect("peer factory"),
        );

        let coordinator = SignalingCoordinator::new(
            control.clone(),
            peers.clone(),
            active.clone(),
            factory,
            users.clone(),
            channels.clone(),
        );

        Self {
            control,
            peers,
            active,
            users,
            channels,
            coordinator,
        }
    }

    /// Register a user and attach a capture-backed control session.
    async fn connect_user(&self, username: &str) -> (Uuid, Arc<Mutex<Captured>>) {
        let user_id = self.users.insert(username);
        let (_, captured) = attach_session(&self.control, user_id).await;
        (user_id, captured)
    }

    /// `MediaPeer(u) exists ⇔ ActiveUser(u) exists`, same channel.
    async fn assert_consistent(&self, user_id: Uuid) {
        let peer = self.peers.get(user_id).await;
        let active = self.active.get(user_id).await;
        match (peer, active) {
            (Some(p), Some(a)) => assert_eq!(p.channel_id, a.channel_id),
            (None, None) => {}
            (p, a) => panic!(
                "registries disagree for {user_id}: peer={} active={}",
                p.is_some(),
                a.is_some()
            ),
        }
    }
}

/// Parse captured frames as JSON values.
async fn frames(captured: &Arc<Mutex<Captured>>) -> Vec<serde_json::Value> {
    captured
        .lock()
        .await
        .frames
        .iter()
        .map(|f| serde_json::from_str(f).expect("captured frame is JSON"))
        .collect()
}

/// Extract the participant lists a session has received, in order.
async fn participant_lists(captured: &Arc<Mutex<Captured>>) -> Vec<Vec<String>> {
    frames(captured)
        .await
        .into_iter()
        .filter(|f| f["type"] == "participants")
        .map(|f| {
            f["data"]["list"]
                .as_array()
                .expect("list")
                .iter()
                .map(|v| v.as_str().expect("username").to_string())
                .collect()
        })
        .collect()
}

fn sorted(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v
}

/// Generate a client-side SDP offer with an audio track slot.
async fn client_audio_offer() -> String {
    use webrtc::api::media_engine::MediaEngine;
    use webrtc::api::APIBuilder;
    use webrtc::peer_connection::configuration::RTCConfiguration;
    use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs().expect("codecs");
    let api = APIBuilder::new().with_media_engine(media_engine).build();

    let pc = api
        .new_peer_connection(RTCConfiguration::default())
        .await
        .expect("client pc");
    pc.add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await
        .expect("transceiver");

    let offer = pc.create_offer(None).await.expect("offer");
    let sdp = offer.sdp.clone();
    pc.close().await.ok();
    sdp
}

#[tokio::test]
async fn single_user_join_and_leave() {
    let h = Harness::new();
    let channel = h.channels.insert("lobby");
    let (u1, captured) = h.connect_user("u1").await;

    h.coordinator
        .handle_join(u1, &channel.to_string())
        .await
        .unwrap();

    assert!(h.peers.get(u1).await.is_some());
    assert_eq!(h.active.get(u1).await.map(|a| a.channel_id), Some(channel));
    h.assert_consistent(u1).await;
    assert_eq!(participant_lists(&captured).await, vec![vec!["u1"]]);

    h.coordinator.handle_leave(u1).await.unwrap();

    assert!(h.peers.get(u1).await.is_none());
    assert!(h.active.get(u1).await.is_none());
    h.assert_consistent(u1).await;
}

#[tokio::test]
async fn join_with_empty_channel_id_rejected() {
    let h = Harness::new();
    let (u1, captured) = h.connect_user("u1").await;

    h.coordinator.handle_join(u1, "").await.unwrap();

    let frames = frames(&captured).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "error");
    assert_eq!(frames[0]["message"], "channel_id is required");
    assert!(h.peers.get(u1).await.is_none());
    assert!(h.active.get(u1).await.is_none());
}

#[tokio::test]
async fn join_with_malformed_channel_id_rejected() {
    let h = Harness::new();
    let (u1, captured) = h.connect_user("u1").await;

    h.coordinator
        .handle_join(u1, "not-a-uuid")
        .await
        .unwrap();

    let frames = frames(&captured).await;
    assert_eq!(frames[0]["message"], "invalid channel_id");
    assert!(h.peers.get(u1).await.is_none());
}

#[tokio::test]
async fn join_unknown_channel_rejected() {
    let h = Harness::new();
    let (u1, captured) = h.connect_user("u1").await;

    h.coordinator
        .handle_join(u1, &Uuid::new_v4().to_string())
        .await
        .unwrap();

    let frames = frames(&captured).await;
    assert_eq!(frames[0]["type"], "error");
    assert_eq!(frames[0]["message"], "channel not found");
    assert!(h.peers.get(u1).await.is_none());
    assert!(h.active.get(u1).await.is_none());
}

#[tokio::test]
async fn repeated_join_is_idempotent() {
    let h = Harness::new();
    let channel = h.channels.insert("lobby");
    let (u1, _) = h.connect_user("u1").await;
    let channel_str = channel.to_string();

    h.coordinator.handle_join(u1, &channel_str).await.unwrap();
    let first_peer = h.peers.get(u1).await.expect("first peer");

    h.coordinator.handle_join(u1, &channel_str).await.unwrap();
    let second_peer = h.peers.get(u1).await.expect("second peer");

    assert!(
        !Arc::ptr_eq(&first_peer, &second_peer),
        "second join must build a fresh peer"
    );
    assert_eq!(
        first_peer.conn.connection_state(),
        webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState::Closed,
        "prior peer must be closed exactly once"
    );
    assert_eq!(h.active.get(u1).await.map(|a| a.channel_id), Some(channel));
    h.assert_consistent(u1).await;
}

#[tokio::test]
async fn leave_without_peer_is_noop() {
    let h = Harness::new();
    let (u1, captured) = h.connect_user("u1").await;

    h.coordinator.handle_leave(u1).await.unwrap();

    assert!(frames(&captured).await.is_empty());
}

#[tokio::test]
async fn ping_yields_pong_each_time() {
    let h = Harness::new();
    let (u1, captured) = h.connect_user("u1").await;

    h.coordinator.handle_ping(u1).await;
    h.coordinator.handle_ping(u1).await;

    let frames = frames(&captured).await;
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f["type"] == "pong"));
}

#[tokio::test]
async fn mute_notifies_other_members_only() {
    let h = Harness::new();
    let channel = h.channels.insert("lobby");
    let channel_str = channel.to_string();
    let (u1, c1) = h.connect_user("u1").await;
    let (u2, c2) = h.connect_user("u2").await;
    let (u3, c3) = h.connect_user("u3").await;

    for user in [u1, u2, u3] {
        h.coordinator.handle_join(user, &channel_str).await.unwrap();
    }

    let before_u2 = frames(&c2).await.len();

    h.coordinator.handle_mute(u2, true).await.unwrap();

    for captured in [&c1, &c3] {
        let frames = frames(captured).await;
        let action = frames
            .iter()
            .find(|f| f["type"] == "user_action")
            .expect("user_action frame");
        assert_eq!(action["data"]["user_name"], "u2");
        assert_eq!(action["data"]["is_muted"], true);
    }

    // The muting user gets no echo.
    assert_eq!(frames(&c2).await.len(), before_u2);
}

#[tokio::test]
async fn mute_without_peer_is_precondition_error() {
    let h = Harness::new();
    let (u1, _) = h.connect_user("u1").await;

    let err = h.coordinator.handle_mute(u1, true).await.unwrap_err();
    assert!(matches!(err, VoiceError::PeerNotFound(id) if id == u1));
}

#[tokio::test]
async fn offer_before_join_is_precondition_error() {
    let h = Harness::new();
    let (u1, _) = h.connect_user("u1").await;

    let err = h
        .coordinator
        .handle_offer(u1, "v=0".into())
        .await
        .unwrap_err();
    assert!(matches!(err, VoiceError::PeerNotFound(_)));

    let err = h
        .coordinator
        .handle_answer(u1, "v=0".into())
        .await
        .unwrap_err();
    assert!(matches!(err, VoiceError::PeerNotFound(_)));

    let err = h
        .coordinator
        .handle_candidate(u1, Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, VoiceError::PeerNotFound(_)));
}

#[tokio::test]
async fn offer_is_answered_on_the_control_channel() {
    let h = Harness::new();
    let channel = h.channels.insert("lobby");
    let (u1, captured) = h.connect_user("u1").await;

    h.coordinator
        .handle_join(u1, &channel.to_string())
        .await
        .unwrap();

    let offer = client_audio_offer().await;
    h.coordinator.handle_offer(u1, offer).await.unwrap();

    let frames = frames(&captured).await;
    let answer = frames
        .iter()
        .find(|f| f["type"] == "answer")
        .expect("answer frame");
    assert!(answer["sdp"]
        .as_str()
        .expect("sdp text")
        .starts_with("v=0"));
}

#[tokio::test]
async fn participant_updates_on_churn() {
    let h = Harness::new();
    let channel = h.channels.insert("lobby");
    let channel_str = channel.to_string();
    let (u1, c1) = h.connect_user("u1").await;
    let (u2, c2) = h.connect_user("u2").await;

    h.coordinator.handle_join(u1, &channel_str).await.unwrap();
    assert_eq!(participant_lists(&c1).await, vec![vec!["u1"]]);

    h.coordinator.handle_join(u2, &channel_str).await.unwrap();
    let u1_lists = participant_lists(&c1).await;
    let u2_lists = participant_lists(&c2).await;
    assert_eq!(sorted(u1_lists.last().unwrap().clone()), vec!["u1", "u2"]);
    assert_eq!(sorted(u2_lists.last().unwrap().clone()), vec!["u1", "u2"]);

    h.coordinator.handle_leave(u1).await.unwrap();
    let u2_lists = participant_lists(&c2).await;
    assert_eq!(u2_lists.last().unwrap().clone(), vec!["u2"]);

    h.assert_consistent(u1).await;
    h.assert_consistent(u2).await;
}

#[tokio::test]
async fn unresolvable_participants_are_skipped() {
    let h = Harness::new();
    let channel = h.channels.insert("lobby");
    let channel_str = channel.to_string();
    let (u1, _c1) = h.connect_user("u1").await;
    let (u2, c2) = h.connect_user("u2").await;

    h.coordinator.handle_join(u1, &channel_str).await.unwrap();
    h.coordinator.handle_join(u2, &channel_str).await.unwrap();

    // u1's record disappears from the store; the next broadcast still
    // reaches both members but only lists resolvable names.
    h.users.forget(u1);
    h.coordinator.broadcast_participants(channel).await;

    let u2_lists = participant_lists(&c2).await;
    assert_eq!(u2_lists.last().unwrap().clone(), vec!["u2"]);
}
