use upscale_farm::accel::{probe_gpus, probe_gpus_with};

#[tokio::test]
async fn test_probe_never_returns_empty() {
    let gpus = probe_gpus().await;
    assert!(!gpus.is_empty());
}

#[tokio::test]
async fn test_absent_tool_fails_open_to_single_slot() {
    let gpus = probe_gpus_with("definitely-not-nvidia-smi-xyz").await;
    assert_eq!(gpus, vec![0]);
}

#[tokio::test]
async fn test_tool_that_rejects_the_query_fails_open() {
    // `hostname` exists everywhere and either rejects the query flags or
    // prints something that does not parse as GPU indices.
    let gpus = probe_gpus_with("hostname").await;
    assert_eq!(gpus, vec![0]);
}
