use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Annotation carrying the rollout revision, stamped by the deployment
/// controller on both the Deployment and each of its ReplicaSets.
pub const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

pub fn annotation_revision(meta: &ObjectMeta) -> Option<String> {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(REVISION_ANNOTATION))
        .cloned()
}

/// A revision is new iff it carries the same revision annotation as the
/// controller's current one. Unknown on either side means not new.
pub fn is_new(controller_revision: Option<&str>, revision: &ReplicaSet) -> bool {
    match (controller_revision, annotation_revision(&revision.metadata)) {
        (Some(current), Some(rs)) => current == rs,
        _ => false,
    }
}

/// Name of the ReplicaSet owning a pod, if any.
pub fn owner_revision_name(pod: &Pod) -> Option<String> {
    pod.metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|owner| owner.kind == "ReplicaSet")
        .map(|owner| owner.name.clone())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    use super::*;

    fn annotated(revision: &str) -> ObjectMeta {
        ObjectMeta {
            annotations: Some(BTreeMap::from([(
                REVISION_ANNOTATION.to_string(),
                revision.to_string(),
            )])),
            ..Default::default()
        }
    }

    #[test]
    fn matching_annotations_mean_new() {
        let rs = ReplicaSet {
            metadata: annotated("3"),
            ..Default::default()
        };
        assert!(is_new(Some("3"), &rs));
        assert!(!is_new(Some("2"), &rs));
        assert!(!is_new(None, &rs));
    }

    #[test]
    fn unannotated_replica_set_is_not_new() {
        assert!(!is_new(Some("3"), &ReplicaSet::default()));
    }

    #[test]
    fn owner_reference_yields_revision_name() {
        let pod = Pod {
            metadata: ObjectMeta {
                owner_references: Some(vec![OwnerReference {
                    kind: "ReplicaSet".to_string(),
                    name: "web-6f8d9".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(owner_revision_name(&pod).as_deref(), Some("web-6f8d9"));

        let orphan = Pod::default();
        assert_eq!(owner_revision_name(&orphan), None);
    }
}
