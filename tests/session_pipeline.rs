use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use vision_relay::detect::StubTagDetector;
use vision_relay::ingest::{stream_channel, StreamFeed};
use vision_relay::transport::MemorySink;
use vision_relay::{
    open_sessions, spawn_camera_workers, CameraIntrinsics, CameraSession, CameraState, Capability,
    ColorFrame, DepthFrame, DetectionNormalizer, LabelTable, NnInputSize, Publication,
    RawDetection, RecordSink, RelayConfig, SensorGeometry, StreamItem, StreamRole, TagRecordBuilder,
    TickLoop,
};

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<Publication>>>);

impl RecordSink for SharedSink {
    fn publish(&mut self, publication: &Publication) -> Result<()> {
        self.0
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .push(publication.clone());
        Ok(())
    }
}

struct Feeds {
    color: StreamFeed,
    depth: StreamFeed,
    nn: StreamFeed,
}

fn intrinsics() -> CameraIntrinsics {
    CameraIntrinsics {
        fx: 1000.0,
        fy: 1000.0,
        cx: 640.0,
        cy: 360.0,
    }
}

fn camera(name: &str, started_at: Instant) -> (CameraState, Feeds) {
    let (color, color_stream) = stream_channel(StreamRole::Color, "rgb", 4);
    let (depth, depth_stream) = stream_channel(StreamRole::Depth, "depth", 4);
    let (nn, nn_stream) = stream_channel(StreamRole::Detections, "nn", 4);
    let state = CameraState::new(name, SensorGeometry::default(), started_at)
        .with_stream(Box::new(color_stream))
        .with_stream(Box::new(depth_stream))
        .with_stream(Box::new(nn_stream));
    (state, Feeds { color, depth, nn })
}

fn full_session(name: &str, started_at: Instant) -> (CameraSession, Feeds) {
    let (state, feeds) = camera(name, started_at);
    let normalizer = DetectionNormalizer::new(
        LabelTable::new(["note", "robot"]),
        NnInputSize::new(300, 300),
        0.2,
    );
    let session = CameraSession::new(state, Capability::Both)
        .with_normalizer(normalizer)
        .with_tags(
            Box::new(StubTagDetector::new("tag36h11", 0.1651, Some(intrinsics())).with_tag(5, 1.0)),
            TagRecordBuilder::new("tag36h11", Some(intrinsics())),
        );
    (session, feeds)
}

fn color_frame() -> ColorFrame {
    ColorFrame::filled(1280, 720, [0, 0, 0])
}

fn detection_batch() -> Vec<RawDetection> {
    vec![
        RawDetection::new(1, [0.4, 0.4, 0.6, 0.6], 0.91).with_spatial(0.0, 0.0, 2540.0),
        RawDetection::new(0, [0.1, 0.1, 0.2, 0.2], 0.75).with_spatial(254.0, 0.0, 1000.0),
    ]
}

#[test]
fn publishes_objects_then_tags_and_stays_quiet_without_new_data() {
    let t0 = Instant::now();
    let (mut session, feeds) = full_session("front", t0);

    assert!(session.process(t0 + Duration::from_millis(10)).unwrap().is_none());

    feeds.color.push(StreamItem::Color(color_frame())).unwrap();
    feeds
        .depth
        .push(StreamItem::Depth(
            DepthFrame::from_millimeters(4, 4, vec![1000; 16]).unwrap(),
        ))
        .unwrap();
    feeds.nn.push(StreamItem::Detections(detection_batch())).unwrap();

    let publication = session
        .process(t0 + Duration::from_millis(50))
        .unwrap()
        .expect("new inputs publish");
    assert_eq!(publication.camera, "front");
    assert_eq!(publication.fps, 20);
    let labels: Vec<&str> = publication.records.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["note", "robot", "tag36h11: 5"]);
    assert_eq!(publication.records[0].x, 10.0);
    assert_eq!(publication.records[1].z, 100.0);
    assert!(publication.records[2].rotation.is_some());
    assert!(session.state().depth_color().is_some());

    assert!(session.process(t0 + Duration::from_millis(60)).unwrap().is_none());
    assert_eq!(session.state().fps(), 20);

    // A color-only tick refreshes tags and republishes the cached objects.
    feeds.color.push(StreamItem::Color(color_frame())).unwrap();
    let publication = session
        .process(t0 + Duration::from_millis(150))
        .unwrap()
        .expect("color refreshes tags");
    assert_eq!(publication.records.len(), 3);
    assert_eq!(publication.fps, 10);
}

#[test]
fn one_item_per_stream_per_tick() {
    let t0 = Instant::now();
    let (mut session, feeds) = full_session("front", t0);
    for _ in 0..3 {
        feeds.nn.push(StreamItem::Detections(detection_batch())).unwrap();
    }
    feeds.color.push(StreamItem::Color(color_frame())).unwrap();

    let mut now = t0;
    let mut published = 0;
    for _ in 0..5 {
        now += Duration::from_millis(10);
        if session.process(now).unwrap().is_some() {
            published += 1;
        }
    }
    assert_eq!(published, 3);
    assert_eq!(session.state().stats().changed_ticks, 3);
    assert_eq!(session.state().stats().ticks, 5);
}

#[test]
fn full_queue_drops_the_oldest_frame() {
    let t0 = Instant::now();
    let (mut state, feeds) = camera("front", t0);
    for width in 1..=6 {
        feeds
            .color
            .push(StreamItem::Color(ColorFrame::filled(width * 10, 10, [0, 0, 0])))
            .unwrap();
    }
    assert_eq!(feeds.color.dropped(), 2);
    assert!(state.tick(t0 + Duration::from_millis(1)));
    assert_eq!(state.color().map(|f| f.width()), Some(30));
}

#[test]
fn feeds_reject_wrong_roles_and_closed_consumers() {
    let (state, feeds) = camera("front", Instant::now());
    assert!(feeds.nn.push(StreamItem::Color(color_frame())).is_err());
    assert!(feeds.color.push(StreamItem::Color(color_frame())).is_ok());

    drop(state);
    assert!(feeds.color.is_closed());
    assert!(feeds.color.push(StreamItem::Color(color_frame())).is_err());
}

#[test]
fn sequential_loop_isolates_a_faulted_camera() {
    let t0 = Instant::now();
    let (front, front_feeds) = full_session("front", t0);
    let (rear, rear_feeds) = full_session("rear", t0);
    let sink = SharedSink::default();
    let mut tick_loop = TickLoop::new(vec![front, rear], Box::new(sink.clone()));

    front_feeds
        .color
        .push(StreamItem::Color(ColorFrame::filled(1280, 0, [0, 0, 0])))
        .unwrap();
    front_feeds
        .nn
        .push(StreamItem::Detections(detection_batch()))
        .unwrap();
    rear_feeds.color.push(StreamItem::Color(color_frame())).unwrap();
    rear_feeds
        .nn
        .push(StreamItem::Detections(detection_batch()))
        .unwrap();

    assert_eq!(tick_loop.run_once(t0 + Duration::from_millis(20)), 1);
    assert!(tick_loop.sessions()[0].is_faulted());
    assert!(tick_loop.sessions()[0]
        .fault()
        .is_some_and(|f| f.contains("front")));

    rear_feeds.color.push(StreamItem::Color(color_frame())).unwrap();
    assert_eq!(tick_loop.run_once(t0 + Duration::from_millis(40)), 1);

    let published = sink.0.lock().unwrap();
    assert!(published.iter().all(|p| p.camera == "rear"));
    assert_eq!(published.len(), 2);
}

#[test]
fn stub_cameras_publish_through_the_sequential_loop() {
    let cfg = RelayConfig::load_from(None).unwrap();
    let sessions = open_sessions(&cfg, true).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].capability(), Capability::Both);

    let sink = SharedSink::default();
    let mut tick_loop = TickLoop::new(sessions, Box::new(sink.clone()));
    let deadline = Instant::now() + Duration::from_secs(5);
    let has_records = |sink: &SharedSink| {
        sink.0
            .lock()
            .unwrap()
            .iter()
            .any(|p| !p.records.is_empty())
    };
    while !has_records(&sink) && Instant::now() < deadline {
        tick_loop.run_once(Instant::now());
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(tick_loop.sessions()[0].annotated_frame().is_some());
    tick_loop.close().unwrap();

    let published = sink.0.lock().unwrap();
    let first = published
        .iter()
        .find(|p| !p.records.is_empty())
        .expect("stub camera published records");
    assert_eq!(first.camera, "front");
}

#[test]
fn stub_cameras_publish_through_workers() {
    let cfg = RelayConfig::load_from(None).unwrap();
    let sessions = open_sessions(&cfg, false).unwrap();
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut workers =
        spawn_camera_workers(sessions, Duration::from_millis(2), shutdown.clone()).unwrap();

    let mut sink = MemorySink::default();
    let forwarded = workers.pump(&mut sink, Some(3)).unwrap();
    workers.join();

    assert_eq!(forwarded, 3);
    assert!(sink.publications.iter().all(|p| p.camera == "front"));
    let json = sink.publications[0].records_json().unwrap();
    assert!(json.starts_with('['));
}
