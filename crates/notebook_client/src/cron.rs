//! Fixed schedule catalog offered by the note settings menu. Expressions are
//! opaque to the client and passed through to the backend scheduler.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronOption {
    pub name: &'static str,
    pub value: Option<&'static str>,
}

pub const CRON_OPTIONS: [CronOption; 8] = [
    CronOption { name: "None", value: None },
    CronOption { name: "1m", value: Some("0 0/1 * * * ?") },
    CronOption { name: "5m", value: Some("0 0/5 * * * ?") },
    CronOption { name: "1h", value: Some("0 0 0/1 * * ?") },
    CronOption { name: "3h", value: Some("0 0 0/3 * * ?") },
    CronOption { name: "6h", value: Some("0 0 0/6 * * ?") },
    CronOption { name: "12h", value: Some("0 0 0/12 * * ?") },
    CronOption { name: "1d", value: Some("0 0 0 * * ?") },
];

/// Display name for a schedule expression: empty for no schedule, the
/// catalog name when known, otherwise the expression itself.
pub fn cron_option_name(value: Option<&str>) -> String {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return String::new();
    };
    CRON_OPTIONS
        .iter()
        .find(|option| option.value == Some(value))
        .map(|option| option.name.to_string())
        .unwrap_or_else(|| value.to_string())
}

pub fn cron_option_value(name: &str) -> Option<&'static str> {
    CRON_OPTIONS
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value)
}
