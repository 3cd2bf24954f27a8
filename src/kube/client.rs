use crate::errors::TrackResult;

pub async fn make_client() -> TrackResult<kube::Client> {
    // Uses KUBECONFIG / ~/.kube/config out-of-cluster, or in-cluster config.
    let client = kube::Client::try_default().await?;
    Ok(client)
}
