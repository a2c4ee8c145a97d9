//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置 → 合成引擎 → 检测 → 融合 → sink 全链路
//! - 延迟与故障隔离的端到端行为

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        BoundingBox, Clock, FusionBatch, ManualClock, SharedClock, StreamDescriptor, StreamId,
        StreamSource, SystemBlueprint, TileSource,
    };
    use fusion::SharedFusion;
    use ingestion::{ScriptedHandle, ScriptedSource, SourceFactory};
    use observability::PipelineMetricsAggregator;
    use sync_engine::{StreamHealthState, SyncEngine};
    use tokio::sync::mpsc;
    use vision::{HomographySet, ScriptedObject, ScriptedTracker, VisionPipeline};

    const FRAME_INTERVAL: f64 = 1.0 / 30.0;

    /// Two cameras; camera 1 is shifted 10 units along x on the ground plane
    fn blueprint_toml(output: &Path) -> String {
        format!(
            r#"
            [[streams]]
            id = 0
            name = "North"
            address = "scripted://north"

            [[streams]]
            id = 1
            name = "South"
            address = "scripted://south"

            [engine]
            tile_width = 32
            tile_height = 32
            reconnect_backoff_s = 0.0
            reconnect_retry_interval_s = 0.01

            [detection]
            enabled = true
            fps = 30.0
            tracker = "dummy"

            [[detection.homographies]]
            camera_id = 1
            matrix = [1.0, 0.0, 10.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]

            [fusion]
            spatial_threshold = 5.0

            [[sinks]]
            name = "jsonl"
            sink_type = "file"

            [sinks.params]
            path = "{}"
            append = "false"
            "#,
            output.display()
        )
    }

    type Handles = Arc<Mutex<HashMap<StreamId, ScriptedHandle>>>;

    /// Factory that also understands `scripted://` and hands back the handles
    fn scripted_factory(clock: Arc<ManualClock>) -> (SourceFactory, Handles) {
        let handles: Handles = Arc::default();
        let mut factory = SourceFactory::new(clock);
        let registry = handles.clone();
        factory.register(
            "scripted",
            Arc::new(
                move |descriptor: &StreamDescriptor,
                      _params: &HashMap<String, String>,
                      _clock: SharedClock|
                      -> ingestion::Result<Arc<dyn StreamSource>> {
                    let (source, handle) = ScriptedSource::new(descriptor.clone());
                    registry.lock().unwrap().insert(descriptor.id, handle);
                    Ok(Arc::new(source))
                },
            ),
        );
        (factory, handles)
    }

    fn handle(handles: &Handles, id: StreamId) -> ScriptedHandle {
        handles.lock().unwrap()[&id].clone()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    fn person(id: &str, x: f32) -> ScriptedObject {
        ScriptedObject::new(id, BoundingBox::new(x - 1.0, 0.0, x + 1.0, 20.0))
    }

    struct Harness {
        blueprint: SystemBlueprint,
        engine: SyncEngine,
        handles: Handles,
        clock: Arc<ManualClock>,
        tracker: ScriptedTracker,
        vision: Arc<VisionPipeline>,
        dispatcher: tokio::task::JoinHandle<Vec<(String, dispatcher::MetricsSnapshot)>>,
    }

    /// Wire config → sources → engine → vision → fusion → dispatcher
    async fn start(output: &Path) -> Harness {
        let blueprint =
            ConfigLoader::load_from_str(&blueprint_toml(output), ConfigFormat::Toml).unwrap();
        let clock = ManualClock::new();
        let (factory, handles) = scripted_factory(clock.clone());
        let sources = factory.create_all(&blueprint.streams).unwrap();

        let homographies = HomographySet::from_config(&blueprint.detection.homographies).unwrap();
        let tracker = ScriptedTracker::new(homographies);
        let (batch_tx, batch_rx) = mpsc::channel::<FusionBatch>(32);
        let vision = Arc::new(
            VisionPipeline::new(
                Box::new(tracker.clone()),
                SharedFusion::new(blueprint.fusion.clone()),
                clock.clone(),
            )
            .with_output(batch_tx),
        );

        let mut engine = SyncEngine::new(blueprint.engine.clone(), sources, clock.clone())
            .unwrap()
            .with_detection(&blueprint.detection, vision.clone());
        let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), batch_rx)
            .unwrap()
            .spawn();

        engine.initialize().unwrap();
        for id in [0, 1] {
            let h = handle(&handles, id);
            wait_until(|| h.is_open()).await;
        }

        Harness {
            blueprint,
            engine,
            handles,
            clock,
            tracker,
            vision,
            dispatcher,
        }
    }

    impl Harness {
        /// Advance time, feed one frame per stream and wait for detection
        async fn step(&mut self, streams: &[StreamId]) -> contracts::CombinedFrame {
            self.clock.advance_secs(0.2);
            for &id in streams {
                handle(&self.handles, id).push_solid(32, 32, [90, 90, 90], self.clock.now());
            }
            let frame = self.engine.produce_frame();
            let control = self.engine.detection_control();
            wait_until(|| !control.is_busy()).await;
            frame
        }

        /// Stop everything and return the batches the file sink wrote
        async fn finish(mut self, output: &Path) -> Vec<FusionBatch> {
            self.engine.shutdown().await;
            drop(self.engine);
            drop(self.vision);
            let sinks = tokio::time::timeout(Duration::from_secs(5), self.dispatcher)
                .await
                .expect("dispatcher did not stop")
                .unwrap();
            assert_eq!(sinks[0].0, "jsonl");

            std::fs::read_to_string(output)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    /// End-to-end: one person seen by both cameras keeps one global id
    #[tokio::test]
    async fn test_e2e_cross_camera_identity() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("fusion.jsonl");
        let mut h = start(&output).await;
        assert_eq!(h.blueprint.streams[1].name, "South");

        // cam0 at x=13, cam1 at x=3 (+10 on the plane): same person
        h.tracker.set_objects(0, vec![person("n1", 13.0)]);
        h.tracker
            .set_objects(1, vec![person("s1", 3.0), person("s2", 25.0)]);

        let mut metrics = PipelineMetricsAggregator::new();
        for _ in 0..3 {
            let frame = h.step(&[0, 1]).await;
            metrics.update_frame(&frame, 0.0);
            assert!(frame
                .tiles
                .iter()
                .all(|t| matches!(t.source, TileSource::Fresh { .. })));
        }
        assert_eq!(metrics.summary().total_frames, 3);
        assert_eq!(h.vision.stats().frames_processed, 3);

        let batches = h.finish(&output).await;
        assert_eq!(batches.len(), 3);

        let id_of = |batch: &FusionBatch, track: &str| {
            batch
                .tracks
                .iter()
                .find(|t| t.track_id == track)
                .map(|t| t.global_id)
                .unwrap()
        };
        let person_id = id_of(&batches[0], "n1");
        for batch in &batches {
            assert_eq!(batch.tracks.len(), 3);
            assert_eq!(id_of(batch, "n1"), person_id);
            assert_eq!(id_of(batch, "s1"), person_id);
            assert_ne!(id_of(batch, "s2"), person_id);
            assert_eq!(batch.stats.total_global_tracks, 2);
        }
        assert_eq!(batches[2].stats.tracks_created, 2);
        assert_eq!(
            batches.iter().map(|b| b.cycle).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    /// A failing stream shows a placeholder and never reaches the tracker;
    /// the healthy stream keeps producing fused tracks
    #[tokio::test]
    async fn test_e2e_stream_failure_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("fusion.jsonl");
        let mut h = start(&output).await;

        h.tracker.set_objects(0, vec![person("n1", 13.0)]);
        h.tracker.set_objects(1, vec![person("s1", 3.0)]);

        h.step(&[0, 1]).await;
        handle(&h.handles, 1).disconnect();
        let frame = h.step(&[0]).await;

        // the background reopen may already be running
        assert_eq!(h.engine.health(0), Some(StreamHealthState::Ready));
        assert_ne!(h.engine.health(1), Some(StreamHealthState::Ready));
        assert_eq!(frame.tile(1).unwrap().source, TileSource::Placeholder);
        assert!(frame.tile(1).unwrap().label.is_some());

        let stats = h.vision.stats();
        assert_eq!(stats.tiles_processed, 3);
        assert_eq!(stats.tiles_skipped, 1);

        let batches = h.finish(&output).await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].tracks.len(), 2);
        assert_eq!(batches[1].tracks.len(), 1);
        assert_eq!(batches[1].tracks[0].track_id, "n1");
        // identity survives the other camera dropping out
        let first = batches[0].tracks.iter().find(|t| t.track_id == "n1").unwrap();
        assert_eq!(batches[1].tracks[0].global_id, first.global_id);
    }

    /// Delay from the config file is applied from the first frame
    #[tokio::test]
    async fn test_e2e_configured_delay() {
        let dir = tempfile::tempdir().unwrap();
        let toml = blueprint_toml(&dir.path().join("unused.jsonl"))
            .replace("name = \"North\"", "name = \"North\"\n            delay_ms = 500");
        let blueprint = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(blueprint.streams[0].delay_ms, 500);

        let clock = ManualClock::new();
        let (factory, handles) = scripted_factory(clock.clone());
        let sources = factory.create_all(&blueprint.streams).unwrap();
        let mut engine = SyncEngine::new(blueprint.engine.clone(), sources, clock.clone()).unwrap();
        engine.initialize().unwrap();
        let north = handle(&handles, 0);
        let south = handle(&handles, 1);
        wait_until(|| north.is_open() && south.is_open()).await;

        let mut last = None;
        for _ in 0..60 {
            clock.advance_secs(FRAME_INTERVAL);
            north.push_solid(32, 32, [200, 0, 0], clock.now());
            south.push_solid(32, 32, [0, 0, 200], clock.now());
            last = Some(engine.produce_frame());
        }

        let frame = last.unwrap();
        let TileSource::Delayed { captured_at } = frame.tile(0).unwrap().source else {
            panic!("expected delayed tile, got {:?}", frame.tile(0).unwrap().source);
        };
        let behind = clock.now() - captured_at;
        assert!(
            (behind - 0.5).abs() <= FRAME_INTERVAL + 1e-6,
            "tile is {behind:.3}s behind"
        );
        assert!(matches!(
            frame.tile(1).unwrap().source,
            TileSource::Fresh { .. }
        ));

        engine.shutdown().await;
    }
}
