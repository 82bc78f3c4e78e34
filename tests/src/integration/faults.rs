//! # Fault Handling
//!
//! Bad copies from single nodes are worked around; unresolved files are
//! deferred in order; a broken chain halts the stream kind unless a bypass
//! window covers it; port failures surface as errors without moving state.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use stream_ingest::{
        ConsensusNode, FileHash, IngestError, IngestResult, IngestService, NodeRegistry,
        PipelineConfig, PipelineRunner, PipelineState, Resolution, SkipReason, StreamFault,
        StreamFile, StreamFileSink, StreamFilename, StreamKind, StreamPublisher,
    };

    use crate::fixtures::{Network, SECOND, T0};

    /// Sink refusing the first `failures` files.
    struct FlakySink {
        failures: AtomicUsize,
        files: Mutex<Vec<StreamFile>>,
    }

    impl FlakySink {
        fn new(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                files: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StreamFileSink for FlakySink {
        async fn accept(&self, file: StreamFile) -> IngestResult<()> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(IngestError::Sink("downstream unavailable".to_string()));
            }
            self.files.lock().push(file);
            Ok(())
        }
    }

    struct UnreachableRegistry;

    #[async_trait]
    impl NodeRegistry for UnreachableRegistry {
        async fn current_nodes(&self) -> IngestResult<Vec<ConsensusNode>> {
            Err(IngestError::Registry("address book unreachable".to_string()))
        }
    }

    fn bypass_config() -> PipelineConfig {
        PipelineConfig::from_toml_str(
            r#"
            download_ratio = 1.0
            list_page_size = 2

            [streams.record.chain_bypass]
            start = "2023-11-14T22:13:20Z"
            end = "2023-11-14T22:13:22Z"
            "#,
        )
        .unwrap()
    }

    fn break_chain(publisher: &mut StreamPublisher) {
        publisher.set_head(Some(FileHash::new(vec![0xee; 48])));
    }

    #[tokio::test]
    async fn test_unknown_version_from_one_node() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        let file = publisher.build(T0, &[b"a"]).unwrap();
        publisher.publish(&file, &network.everyone()).unwrap();
        let mut bad = file.bytes.to_vec();
        bad[..4].copy_from_slice(&7i32.to_be_bytes());
        let bad_node = network.nodes[1].id.clone();
        publisher.publish_raw(&bad_node, &file.filename, Bytes::from(bad));

        let mut runner = network
            .runner(StreamKind::Record, PipelineConfig::for_testing())
            .await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 1);
        assert_eq!(network.sink.files()[0].hash, file.hash);
        for fault in &report.faults {
            assert_eq!(fault.label(), "malformed_file");
            assert_eq!(fault.node(), Some(&bad_node));
        }
    }

    #[tokio::test]
    async fn test_tampered_copy_is_hash_mismatch() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        let file = publisher.build(T0, &[b"honest"]).unwrap();
        publisher.publish(&file, &network.everyone()).unwrap();

        let mut forger = network.publisher(StreamKind::Record);
        let forged = forger.build(T0, &[b"forged"]).unwrap();
        let bad_node = network.nodes[0].id.clone();
        publisher.publish_raw(&bad_node, &file.filename, forged.bytes.clone());

        let mut runner = network
            .runner(StreamKind::Record, PipelineConfig::for_testing())
            .await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 1);
        assert_eq!(network.sink.files()[0].hash, file.hash);
        assert_ne!(network.sink.files()[0].source_node, bad_node);
        assert!(report
            .faults
            .iter()
            .all(|f| matches!(f, StreamFault::HashMismatch { node, .. } if *node == bad_node)));
    }

    #[tokio::test]
    async fn test_minority_signature_over_other_hash() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        let file = publisher.build(T0, &[b"a"]).unwrap();
        publisher.publish(&file, &network.everyone()).unwrap();
        publisher.publish_signature_for(
            &network.nodes[2],
            T0,
            &FileHash::new(vec![0x11; 48]),
            file.metadata_hash.as_ref(),
        );

        let mut runner = network
            .runner(StreamKind::Record, PipelineConfig::for_testing())
            .await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 1);
        assert_eq!(network.sink.files()[0].hash, file.hash);
    }

    #[tokio::test]
    async fn test_quorum_shortfall_holds_later_files() {
        let network = Network::ed25519(6, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        let files: Vec<_> = (0..3)
            .map(|i| publisher.build(T0 + i * SECOND, &[b"x"]).unwrap())
            .collect();
        publisher.publish(&files[0], &network.everyone()).unwrap();
        publisher.publish(&files[1], &[&network.nodes[0]]).unwrap();
        publisher.publish(&files[2], &network.everyone()).unwrap();

        let mut runner = network
            .runner(StreamKind::Record, PipelineConfig::for_testing())
            .await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 1);
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.faults_labelled("quorum_not_reached"), 1);
        assert_eq!(runner.state().last_hash.as_ref(), Some(&files[0].hash));

        publisher.publish(&files[1], &[&network.nodes[1]]).unwrap();
        let report = runner.run_pass().await.unwrap();
        assert_eq!(report.accepted(), 2);
        assert_eq!(runner.state().last_hash.as_ref(), Some(&files[2].hash));
    }

    #[tokio::test]
    async fn test_transient_failures_retry_next_pass() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        let file = publisher.build(T0, &[b"a"]).unwrap();
        publisher.publish(&file, &network.everyone()).unwrap();
        let keys: Vec<_> = network
            .nodes
            .iter()
            .map(|n| StreamKind::Record.object_key(&n.id, &file.filename))
            .collect();
        for key in &keys {
            network.store.fail_key(key.clone());
        }

        let mut runner = network
            .runner(StreamKind::Record, PipelineConfig::for_testing())
            .await;
        let report = runner.run_pass().await.unwrap();
        assert_eq!(report.accepted(), 0);
        assert_eq!(
            report.outcomes[0].resolution,
            Resolution::Skipped(SkipReason::NoValidCopy)
        );
        assert!(report.faults_labelled("transient_io") >= 3);

        for key in &keys {
            network.store.heal_key(key);
        }
        assert_eq!(runner.run_pass().await.unwrap().accepted(), 1);
    }

    #[tokio::test]
    async fn test_discontinuity_halts_until_cleared() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        let good = network.publish_run(&mut publisher, T0, 2);
        break_chain(&mut publisher);
        network.publish_run(&mut publisher, T0 + 2 * SECOND, 2);

        let mut service = IngestService::new(
            PipelineConfig::for_testing(),
            network.store.clone(),
            network.registry.clone(),
            network.states.clone(),
            network.sink.clone(),
        )
        .await
        .unwrap();

        let results = service.run_once().await;
        let (_, record) = results
            .iter()
            .find(|(kind, _)| *kind == StreamKind::Record)
            .unwrap();
        let report = record.as_ref().unwrap();
        assert!(report.halted);
        assert_eq!(report.accepted(), 2);
        assert_eq!(report.faulted(), 1);
        assert_eq!(report.faults_labelled("chain_discontinuity"), 1);
        assert!(matches!(
            report.outcomes.last().map(|o| &o.resolution),
            Some(Resolution::Skipped(SkipReason::AwaitingPredecessor))
        ));

        // Halted kinds sit out; the others keep running
        let results = service.run_once().await;
        assert!(results.iter().all(|(kind, _)| *kind != StreamKind::Record));
        assert_eq!(
            network.states.get(StreamKind::Record).and_then(|s| s.last_hash),
            Some(good[1].hash.clone())
        );

        let runner = service.runner_mut(StreamKind::Record).unwrap();
        assert!(runner.is_halted());
        runner.clear_halt();
        assert!(matches!(runner.run_pass().await, Ok(report) if report.halted));
    }

    #[tokio::test]
    async fn test_bypass_window_accepts_break() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        let first = publisher.build(T0, &[b"a"]).unwrap();
        publisher.publish(&first, &network.everyone()).unwrap();
        break_chain(&mut publisher);
        let bridged = network.publish_run(&mut publisher, T0 + SECOND, 1);
        break_chain(&mut publisher);
        network.publish_run(&mut publisher, T0 + 5 * SECOND, 1);

        let mut runner = network.runner(StreamKind::Record, bypass_config()).await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 2);
        assert!(report.halted);
        assert_eq!(runner.state().last_hash.as_ref(), Some(&bridged[0].hash));
    }

    #[tokio::test]
    async fn test_sidecar_mismatch_everywhere_defers() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        let file = publisher
            .build_with_sidecars(T0, &[b"a"], &[Bytes::from_static(b"blob")])
            .unwrap();
        for node in &network.nodes {
            publisher.publish_data(&file, &node.id).unwrap();
            publisher.publish_signature(&file, node);
            publisher.publish_raw(&node.id, &file.sidecars[0].0, Bytes::from_static(b"junk"));
        }

        let mut runner = network
            .runner(StreamKind::Record, PipelineConfig::for_testing())
            .await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 0);
        assert_eq!(report.faults_labelled("sidecar_mismatch"), 3);
        assert_eq!(
            report.outcomes[0].resolution,
            Resolution::Skipped(SkipReason::SidecarUnavailable)
        );

        publisher.publish_sidecars(&file, &network.nodes[1].id);
        let report = runner.run_pass().await.unwrap();
        assert_eq!(report.accepted(), 1);
        let sunk = network.sink.files();
        assert_eq!(sunk[0].sidecars[0].bytes.as_deref(), Some(&b"blob"[..]));
    }

    #[tokio::test]
    async fn test_sidecars_ignored_when_disabled() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        let file = publisher
            .build_with_sidecars(T0, &[b"a"], &[Bytes::from_static(b"blob")])
            .unwrap();
        for node in &network.nodes {
            publisher.publish_data(&file, &node.id).unwrap();
            publisher.publish_signature(&file, node);
        }
        let config = PipelineConfig {
            sidecars_enabled: false,
            ..PipelineConfig::for_testing()
        };

        let mut runner = network.runner(StreamKind::Record, config).await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 1);
        assert!(network.sink.files()[0].sidecars[0].bytes.is_none());
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_state() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        network.publish_run(&mut publisher, T0, 2);
        let sink = Arc::new(FlakySink::new(1));

        let mut runner = PipelineRunner::new(
            StreamKind::Record,
            PipelineConfig::for_testing(),
            network.store.clone(),
            network.registry.clone(),
            network.states.clone(),
            sink.clone(),
        )
        .await
        .unwrap();

        assert!(matches!(runner.run_pass().await, Err(IngestError::Sink(_))));
        assert_eq!(runner.state(), &PipelineState::initial(StreamKind::Record));
        assert!(network.states.get(StreamKind::Record).is_none());

        let report = runner.run_pass().await.unwrap();
        assert_eq!(report.accepted(), 2);
        assert_eq!(sink.files.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_registry_failure_is_error() {
        let network = Network::ed25519(1, 10);
        let mut runner = PipelineRunner::new(
            StreamKind::Event,
            PipelineConfig::for_testing(),
            network.store.clone(),
            Arc::new(UnreachableRegistry),
            network.states.clone(),
            network.sink.clone(),
        )
        .await
        .unwrap();

        assert!(matches!(runner.run_pass().await, Err(IngestError::Registry(_))));
    }

    #[tokio::test]
    async fn test_garbage_keys_are_ignored() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        network.publish_run(&mut publisher, T0, 1);
        let node = &network.nodes[0].id;
        let dir = StreamKind::Record.node_directory(node);
        network.store.put(format!("{dir}README.txt"), Bytes::from_static(b"hi"));
        let stray = StreamFilename::data(StreamKind::Event, T0 + SECOND, false);
        network
            .store
            .put(format!("{dir}{}", stray.name()), Bytes::from_static(b"x"));

        let mut runner = network
            .runner(StreamKind::Record, PipelineConfig::for_testing())
            .await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 1);
        assert!(report.faults.is_empty());
    }
}
