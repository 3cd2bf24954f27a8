use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

/// Renders a `LabelSelector` into the string form accepted by list and
/// watch requests, e.g. `app=web,tier in (frontend,backend)`.
///
/// Returns `None` for an empty selector (which would otherwise select
/// everything in the namespace).
pub fn selector_string(selector: &LabelSelector) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    if let Some(labels) = &selector.match_labels {
        for (key, value) in labels {
            parts.push(format!("{key}={value}"));
        }
    }

    if let Some(exprs) = &selector.match_expressions {
        for expr in exprs {
            let key = &expr.key;
            let values = expr.values.clone().unwrap_or_default().join(",");

            match expr.operator.as_str() {
                "In" => parts.push(format!("{key} in ({values})")),
                "NotIn" => parts.push(format!("{key} notin ({values})")),
                "Exists" => parts.push(key.clone()),
                "DoesNotExist" => parts.push(format!("!{key}")),
                op => {
                    tracing::warn!(operator = %op, key = %key, "skipping unknown selector operator");
                }
            }
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;

    use super::*;

    #[test]
    fn empty_selector_is_none() {
        assert_eq!(selector_string(&LabelSelector::default()), None);
    }

    #[test]
    fn match_labels_render_sorted() {
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([
                ("app".to_string(), "web".to_string()),
                ("tier".to_string(), "frontend".to_string()),
            ])),
            ..Default::default()
        };

        assert_eq!(
            selector_string(&selector).as_deref(),
            Some("app=web,tier=frontend")
        );
    }

    #[test]
    fn match_expressions_render() {
        let selector = LabelSelector {
            match_expressions: Some(vec![
                LabelSelectorRequirement {
                    key: "env".to_string(),
                    operator: "In".to_string(),
                    values: Some(vec!["prod".to_string(), "stage".to_string()]),
                },
                LabelSelectorRequirement {
                    key: "canary".to_string(),
                    operator: "DoesNotExist".to_string(),
                    values: None,
                },
            ]),
            ..Default::default()
        };

        assert_eq!(
            selector_string(&selector).as_deref(),
            Some("env in (prod,stage),!canary")
        );
    }
}
