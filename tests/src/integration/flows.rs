//! # Ingestion Flows
//!
//! Passes where every file eventually lands:
//!
//! 1. Chained record files across several passes
//! 2. Restart from persisted state
//! 3. Compressed copies preferred over plain ones
//! 4. Each data file handed to the sink once, however many nodes hold it
//! 5. Mixed signature algorithms, other digests, unchained balance files
//! 6. Sampling a subset of nodes
//! 7. Pass metrics

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use shared_crypto::DigestAlgorithm;
    use stream_telemetry::{register_metrics, FILES_ACCEPTED, SIGNATURE_VERIFICATIONS};
    use stream_ingest::{
        IngestService, JsonFileStateStore, PipelineConfig, PipelineRunner, SimulatedNode,
        StreamFilename, StreamKind,
    };

    use crate::fixtures::{Network, SECOND, T0};

    #[tokio::test]
    async fn test_chain_grows_across_passes() {
        let network = Network::ed25519(4, 25);
        let mut publisher = network.publisher(StreamKind::Record);
        let mut runner = network
            .runner(StreamKind::Record, PipelineConfig::for_testing())
            .await;

        let first = network.publish_run(&mut publisher, T0, 3);
        let report = runner.run_pass().await.unwrap();
        assert_eq!(report.accepted(), 3);
        assert_eq!(report.nodes_selected, 4);

        let second = network.publish_run(&mut publisher, T0 + 10 * SECOND, 2);
        let report = runner.run_pass().await.unwrap();
        assert_eq!(report.accepted(), 2);
        assert_eq!(
            report.resume_marker.as_ref().map(StreamFilename::timestamp),
            Some(T0 + 11 * SECOND)
        );

        let files = network.sink.files();
        let expected: Vec<_> = first.iter().chain(&second).map(|f| f.hash.clone()).collect();
        assert_eq!(files.iter().map(|f| f.hash.clone()).collect::<Vec<_>>(), expected);
        for pair in files.windows(2) {
            assert_eq!(pair[1].previous_hash.as_ref(), Some(&pair[0].hash));
        }
    }

    #[tokio::test]
    async fn test_restart_resumes_from_saved_state() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        network.publish_run(&mut publisher, T0, 2);

        let mut runner = network
            .runner(StreamKind::Record, PipelineConfig::for_testing())
            .await;
        runner.run_pass().await.unwrap();
        let saved = runner.state().clone();
        drop(runner);

        let later = network.publish_run(&mut publisher, T0 + 5 * SECOND, 1);
        let mut restarted = network
            .runner(StreamKind::Record, PipelineConfig::for_testing())
            .await;
        assert_eq!(restarted.state(), &saved);

        let report = restarted.run_pass().await.unwrap();
        assert_eq!(report.accepted(), 1);
        assert_eq!(report.accepted_hashes(), vec![&later[0].hash]);
        assert_eq!(network.sink.len(), 3);
    }

    #[tokio::test]
    async fn test_restart_from_json_state_files() {
        let dir = tempfile::tempdir().unwrap();
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Event);
        let files = network.publish_run(&mut publisher, T0, 2);

        for expected in [2, 0] {
            let mut runner = PipelineRunner::new(
                StreamKind::Event,
                PipelineConfig::for_testing(),
                network.store.clone(),
                network.registry.clone(),
                Arc::new(JsonFileStateStore::new(dir.path())),
                network.sink.clone(),
            )
            .await
            .unwrap();
            let report = runner.run_pass().await.unwrap();
            assert_eq!(report.accepted(), expected);
            assert_eq!(runner.state().last_hash.as_ref(), Some(&files[1].hash));
        }
    }

    #[tokio::test]
    async fn test_compressed_copy_preferred() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record).with_compression(true);
        let file = publisher.build(T0, &[b"payload"]).unwrap();
        publisher.publish(&file, &[&network.nodes[0]]).unwrap();
        let plain = StreamFilename::data(StreamKind::Record, T0, false);
        for node in &network.nodes[1..] {
            publisher.publish_signature(&file, node);
            publisher.publish_raw(&node.id, &plain, file.bytes.clone());
        }

        let mut runner = network
            .runner(StreamKind::Record, PipelineConfig::for_testing())
            .await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 1);
        let accepted = &network.sink.files()[0];
        assert!(accepted.filename.is_compressed());
        assert_eq!(accepted.source_node, network.nodes[0].id);
        assert_eq!(accepted.hash, file.hash);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_each_file_sunk_once() {
        let network = Network::ed25519(6, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        let files = network.publish_run(&mut publisher, T0, 12);

        let mut runner = network
            .runner(StreamKind::Record, PipelineConfig::for_testing())
            .await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 12);
        let sunk = network.sink.files();
        assert_eq!(sunk.len(), 12);
        let unique: HashSet<_> = sunk.iter().map(|f| f.filename.clone()).collect();
        assert_eq!(unique.len(), 12);
        assert_eq!(sunk.last().map(|f| &f.hash), files.last().map(|f| &f.hash));
    }

    #[tokio::test]
    async fn test_mixed_signature_algorithms() {
        let network = Network::with_nodes(vec![
            SimulatedNode::ed25519("0.0.3", 10, 1),
            SimulatedNode::secp256k1("0.0.4", 10, 2).unwrap(),
            SimulatedNode::secp256k1("0.0.5", 10, 3).unwrap(),
        ]);
        let mut publisher = network.publisher(StreamKind::Event);
        network.publish_run(&mut publisher, T0, 2);

        let mut runner = network
            .runner(StreamKind::Event, PipelineConfig::for_testing())
            .await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 2);
        assert!(report.faults.is_empty());
    }

    #[tokio::test]
    async fn test_sha256_event_stream() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network
            .publisher(StreamKind::Event)
            .with_digest(DigestAlgorithm::Sha256)
            .with_version(2);
        let files = network.publish_run(&mut publisher, T0, 3);
        let mut config = PipelineConfig::for_testing();
        config.streams.event.digest = DigestAlgorithm::Sha256;

        let mut runner = network.runner(StreamKind::Event, config).await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 3);
        assert_eq!(files[2].hash.len(), 32);
        assert_eq!(runner.state().last_hash.as_ref(), Some(&files[2].hash));
    }

    #[tokio::test]
    async fn test_balance_files_are_not_chained() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Balance);
        network.publish_run(&mut publisher, T0, 3);

        let mut runner = network
            .runner(StreamKind::Balance, PipelineConfig::for_testing())
            .await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.accepted(), 3);
        assert!(network
            .sink
            .files()
            .iter()
            .all(|f| f.previous_hash.is_none() && f.kind == StreamKind::Balance));
    }

    #[tokio::test]
    async fn test_download_ratio_samples_nodes() {
        let network = Network::ed25519(4, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        network.publish_run(&mut publisher, T0, 3);
        let config = PipelineConfig {
            download_ratio: 0.5,
            ..PipelineConfig::for_testing()
        };

        let mut runner = network.runner(StreamKind::Record, config).await;
        let report = runner.run_pass().await.unwrap();

        assert_eq!(report.nodes_total, 4);
        assert_eq!(report.nodes_selected, 2);
        assert_eq!(report.accepted(), 3);
    }

    #[tokio::test]
    async fn test_max_files_per_pass() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Record);
        network.publish_run(&mut publisher, T0, 5);
        let config = PipelineConfig {
            max_files_per_pass: 2,
            ..PipelineConfig::for_testing()
        };

        let mut runner = network.runner(StreamKind::Record, config).await;
        assert_eq!(runner.run_pass().await.unwrap().accepted(), 2);
        assert_eq!(runner.run_pass().await.unwrap().accepted(), 2);
        assert_eq!(runner.run_pass().await.unwrap().accepted(), 1);
    }

    #[tokio::test]
    async fn test_service_ingests_all_kinds() {
        let network = Network::ed25519(3, 10);
        for kind in StreamKind::ALL {
            let mut publisher = network.publisher(kind);
            network.publish_run(&mut publisher, T0, 2);
        }
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

        assert_eq!(results.len(), 3);
        assert_eq!(network.sink.len(), 6);
        for kind in StreamKind::ALL {
            assert!(network.states.get(kind).is_some());
        }
    }

    #[tokio::test]
    async fn test_pass_updates_metrics() {
        let network = Network::ed25519(3, 10);
        let mut publisher = network.publisher(StreamKind::Balance);
        network.publish_run(&mut publisher, T0, 2);
        let accepted = FILES_ACCEPTED.with_label_values(&["balance"]).get();
        let verified = SIGNATURE_VERIFICATIONS
            .with_label_values(&["ed25519", "valid"])
            .get();

        let mut runner = network
            .runner(StreamKind::Balance, PipelineConfig::for_testing())
            .await;
        runner.run_pass().await.unwrap();

        assert!(FILES_ACCEPTED.with_label_values(&["balance"]).get() >= accepted + 2.0);
        assert!(
            SIGNATURE_VERIFICATIONS
                .with_label_values(&["ed25519", "valid"])
                .get()
                >= verified + 6.0
        );
        // Only the first registration in this process succeeds
        if let Ok(handle) = register_metrics() {
            let text = handle.encode().unwrap();
            assert!(text.contains("stream_pass_duration_seconds"));
        }
    }
}
