const INSTANCE_PLACEHOLDER: &str = "${instance}";
const MERGED_LABELS_PREAMBLE: &str = "{{- $mergedLabels := mergeLabelValues $values -}}\n";
const MERGED_INSTANCE: &str = "{{$mergedLabels.instance}}";

/// Translates a legacy alert message into a notification template.
///
/// Only `${instance}` is understood. It expands to the instance label merged
/// across all series of the evaluation. Any other text passes through verbatim.
pub fn migrate_template(message: &str) -> String {
    if !message.contains(INSTANCE_PLACEHOLDER) {
        return message.to_string();
    }
    format!(
        "{MERGED_LABELS_PREAMBLE}{}",
        message.replace(INSTANCE_PLACEHOLDER, MERGED_INSTANCE)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_messages_pass_through() {
        assert_eq!(migrate_template("disk is full"), "disk is full");
        assert_eq!(migrate_template("value ${value}"), "value ${value}");
        assert_eq!(migrate_template(""), "");
    }

    #[test]
    fn instance_placeholder_gets_preamble() {
        assert_eq!(
            migrate_template("${instance} is down"),
            "{{- $mergedLabels := mergeLabelValues $values -}}\n{{$mergedLabels.instance}} is down"
        );
    }

    #[test]
    fn every_placeholder_is_replaced() {
        let out = migrate_template("${instance} and ${instance}");
        assert_eq!(out.matches("{{$mergedLabels.instance}}").count(), 2);
        assert_eq!(out.matches("mergeLabelValues").count(), 1);
    }
}
