mod common;

use common::FakeCloud;
use perconaflow_cloud::CloudProvider;
use perconaflow_cluster::{ClusterError, ClusterFacade, ProductOutputs};
use perconaflow_config::parse_cluster_str;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const PXC_CLUSTER: &str = r#"
provider "aws" {
    region "us-east-1"
    disable-telemetry #true
}

cluster "pxc" {
    key-pair-name "percona"
    path-to-key-pair-storage "/tmp/keys"
    instance-type "t3.micro"
    cluster-size 2
}
"#;

#[tokio::test]
async fn test_create_then_destroy() {
    let cloud = Arc::new(FakeCloud::new());
    let facade = ClusterFacade::new(cloud.clone(), CancellationToken::new());
    let config = parse_cluster_str(PXC_CLUSTER).unwrap();

    let created = facade.create(&config).await.unwrap();

    assert_eq!(created.resource_id.as_str().len(), 20);
    assert_eq!(created.product, "pxc");
    assert_eq!(created.cloud, "fake");
    let ProductOutputs::XtraDbCluster(outputs) = &created.outputs else {
        panic!("unexpected outputs: {:?}", created.outputs);
    };
    assert_eq!(outputs.instances.len(), 2);

    let json = serde_json::to_value(&created).unwrap();
    assert_eq!(json["outputs"]["instances"][0]["public_ip"], "54.0.0.1");

    let listed = cloud
        .list_instances(&created.resource_id, &Default::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);

    facade.destroy(&config, &created.resource_id).await.unwrap();
    assert_eq!(cloud.configured(), vec![created.resource_id.clone(), created.resource_id.clone()]);
    assert_eq!(cloud.deleted(), vec![created.resource_id.clone()]);
}

#[tokio::test]
async fn test_each_create_gets_new_resource_id() {
    let cloud = Arc::new(FakeCloud::new());
    let facade = ClusterFacade::new(cloud, CancellationToken::new());
    let config = parse_cluster_str(PXC_CLUSTER).unwrap();

    let first = facade.create(&config).await.unwrap();
    let second = facade.create(&config).await.unwrap();

    assert_ne!(first.resource_id, second.resource_id);
}

#[tokio::test]
async fn test_failed_create_names_resource_to_destroy() {
    let cloud = Arc::new(FakeCloud::failing_on("systemctl start mysql@bootstrap"));
    let facade = ClusterFacade::new(cloud.clone(), CancellationToken::new());
    let config = parse_cluster_str(PXC_CLUSTER).unwrap();

    let err = facade.create(&config).await.unwrap_err();

    let resource_id = err.resource_id().cloned().unwrap();
    assert!(err.to_string().starts_with(&format!("create {} failed: ", resource_id)));
    assert!(matches!(err.root(), ClusterError::Cloud(_)));

    let left_behind = cloud
        .list_instances(&resource_id, &Default::default())
        .await
        .unwrap();
    assert_eq!(left_behind.len(), 2);

    facade.destroy(&config, &resource_id).await.unwrap();
    assert_eq!(cloud.deleted(), vec![resource_id]);
}
