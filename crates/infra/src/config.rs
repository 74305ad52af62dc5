//! Runtime settings.
//!
//! Settings are read once from a [`PropertySource`] (process environment or a
//! plain map) and then injected into the service. Business code never reads
//! properties directly.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use wholesale_core::Money;
use wholesale_payments::{DocType, FeeSchedule, SubmissionPolicy, normalize_method, normalize_prefix};

use crate::schema::OrderColumns;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// String key-value property store.
pub trait PropertySource {
    fn property(&self, key: &str) -> Option<String>;

    fn keys(&self) -> Vec<String>;
}

impl PropertySource for HashMap<String, String> {
    fn property(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        HashMap::keys(self).cloned().collect()
    }
}

/// Process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvProperties;

impl PropertySource for EnvProperties {
    fn property(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars().map(|(k, _)| k).collect()
    }
}

const FEE_PCT_PREFIX: &str = "WH_FEE_PCT_";
const FEE_FLAT_PREFIX: &str = "WH_FEE_FLAT_";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub doc_prefix: String,
    pub docs_enabled: bool,
    pub policy: SubmissionPolicy,
    pub orders_tab_names: Vec<String>,
    pub ledger_scan_window: Option<usize>,
    pub submit_lock_wait: Duration,
    pub sequence_lock_wait: Duration,
    pub fees: FeeSchedule,
    pub templates: HashMap<DocType, String>,
    pub order_columns: OrderColumns,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            doc_prefix: normalize_prefix(""),
            docs_enabled: true,
            policy: SubmissionPolicy::default(),
            orders_tab_names: Vec::new(),
            ledger_scan_window: None,
            submit_lock_wait: Duration::from_secs(25),
            sequence_lock_wait: Duration::from_secs(5),
            fees: FeeSchedule::default(),
            templates: HashMap::new(),
            order_columns: OrderColumns::default(),
        }
    }
}

fn template_key(doc_type: DocType) -> String {
    format!("TEMPLATE_{}_ADM", doc_type.as_str())
}

fn csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

struct Reader<'a, P: ?Sized> {
    source: &'a P,
}

impl<P: PropertySource + ?Sized> Reader<'_, P> {
    /// Trimmed value; blank counts as unset.
    fn get(&self, key: &str) -> Option<String> {
        self.source
            .property(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn money(&self, key: &str) -> Result<Option<Money>, ConfigError> {
        self.get(key)
            .map(|v| Money::parse(&v).map_err(|e| ConfigError::invalid(key, &v, e.to_string())))
            .transpose()
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get(key)
            .map(|v| {
                v.parse::<T>()
                    .map_err(|_| ConfigError::invalid(key, &v, "expected a non-negative integer"))
            })
            .transpose()
    }

    fn percent(&self, key: &str) -> Result<Option<f64>, ConfigError> {
        self.get(key)
            .map(|v| {
                v.trim_end_matches('%')
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|p| p.is_finite() && *p >= 0.0)
                    .ok_or_else(|| ConfigError::invalid(key, &v, "expected a percentage"))
            })
            .transpose()
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.get(key)
            .map(|v| match v.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Ok(true),
                "false" | "no" | "0" | "off" => Ok(false),
                _ => Err(ConfigError::invalid(key, &v, "expected true or false")),
            })
            .transpose()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_properties(&EnvProperties)
    }

    pub fn from_properties<P: PropertySource + ?Sized>(source: &P) -> Result<Self, ConfigError> {
        let props = Reader { source };
        let mut settings = Settings::default();

        if let Some(prefix) = props.get("WH_DOC_PREFIX") {
            settings.doc_prefix = normalize_prefix(&prefix);
        }
        if let Some(enabled) = props.flag("WH_DOCS_ENABLED")? {
            settings.docs_enabled = enabled;
        }
        if let Some(per_order) = props.money("WH_DEFAULT_SHIP_PER_ORDER")? {
            settings.policy.ship_per_order = per_order;
        }
        if let Some(threshold) = props.money("WH_SHIP_THRESHOLD_SUBTOTAL")? {
            settings.policy.ship_threshold = threshold;
        }
        if let Some(days) = props.number::<u64>("WH_DUE_DAYS")? {
            settings.policy.due_days = days;
        }
        if let Some(tabs) = props.get("WH_ORDERS_TAB_NAMES_CSV") {
            settings.orders_tab_names = csv(&tabs);
        }
        settings.ledger_scan_window = props
            .number::<usize>("WH_LEDGER_SCAN_WINDOW")?
            .filter(|w| *w > 0);
        if let Some(secs) = props.number::<u64>("WH_SUBMIT_LOCK_WAIT_SECS")? {
            settings.submit_lock_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = props.number::<u64>("WH_SEQUENCE_LOCK_WAIT_SECS")? {
            settings.sequence_lock_wait = Duration::from_secs(secs);
        }

        settings.fees = fee_schedule(&props)?;

        for doc_type in DocType::SUBMITTABLE {
            let key = template_key(doc_type);
            if let Some(id) = props.get(&key) {
                settings.templates.insert(doc_type, id);
            }
        }

        let aliases = |key: &str| props.get(key).map(|v| csv(&v)).unwrap_or_default();
        settings.order_columns = OrderColumns::with_overrides(
            &aliases("WH_SO_COL_ALIASES"),
            &aliases("WH_CUSTID_COL_ALIASES"),
            &aliases("WH_PRODUCT_DESC_ALIASES"),
        );

        Ok(settings)
    }

    /// Template id configured for `doc_type`.
    pub fn template_for(&self, doc_type: DocType) -> Option<&str> {
        self.templates.get(&doc_type).map(String::as_str)
    }

    /// Property key that holds the template id for `doc_type`.
    pub fn template_key(doc_type: DocType) -> String {
        template_key(doc_type)
    }
}

/// JSON rules first, then per-method `WH_FEE_PCT_<METHOD>` / `WH_FEE_FLAT_<METHOD>`
/// keys on top. A method only named by per-method keys starts from a zero rule.
fn fee_schedule<P: PropertySource + ?Sized>(props: &Reader<'_, P>) -> Result<FeeSchedule, ConfigError> {
    let mut schedule = match props.get("WH_FEE_RULES_JSON") {
        Some(json) => FeeSchedule::from_json(&json)
            .map_err(|e| ConfigError::invalid("WH_FEE_RULES_JSON", &json, e.to_string()))?,
        None => FeeSchedule::default(),
    };

    let mut methods: Vec<String> = props
        .source
        .keys()
        .iter()
        .filter_map(|key| {
            key.strip_prefix(FEE_PCT_PREFIX)
                .or_else(|| key.strip_prefix(FEE_FLAT_PREFIX))
                .map(str::to_string)
        })
        .filter(|method| !method.is_empty())
        .collect();
    methods.sort();
    methods.dedup();

    for method in methods {
        let name = method.replace('_', " ");
        let is_default = method.eq_ignore_ascii_case("DEFAULT");
        let mut rule = if is_default {
            *schedule.default_rule()
        } else {
            schedule
                .methods()
                .find(|(m, _)| *m == normalize_method(&name))
                .map(|(_, r)| *r)
                .unwrap_or_default()
        };
        if let Some(pct) = props.percent(&format!("{FEE_PCT_PREFIX}{method}"))? {
            rule.pct = pct;
        }
        if let Some(flat) = props.money(&format!("{FEE_FLAT_PREFIX}{method}"))? {
            rule.flat = flat;
        }
        schedule.set_rule(if is_default { "default" } else { &name }, rule);
    }
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = Settings::from_properties(&props(&[])).unwrap();
        assert_eq!(settings.doc_prefix, "ADM");
        assert!(settings.docs_enabled);
        assert_eq!(settings.policy.ship_per_order, Money::from_cents(5_000));
        assert_eq!(settings.policy.ship_threshold, Money::from_cents(200_000));
        assert_eq!(settings.policy.due_days, 2);
        assert_eq!(settings.submit_lock_wait, Duration::from_secs(25));
        assert_eq!(settings.sequence_lock_wait, Duration::from_secs(5));
        assert_eq!(settings.ledger_scan_window, None);
        assert!(settings.templates.is_empty());
    }

    #[test]
    fn reads_overrides() {
        let settings = Settings::from_properties(&props(&[
            ("WH_DOC_PREFIX", " inv "),
            ("WH_DOCS_ENABLED", "false"),
            ("WH_DEFAULT_SHIP_PER_ORDER", "35"),
            ("WH_DUE_DAYS", "7"),
            ("WH_ORDERS_TAB_NAMES_CSV", "Orders, 2025 Orders,"),
            ("WH_LEDGER_SCAN_WINDOW", "500"),
            ("TEMPLATE_SALES_RECEIPT_ADM", "tmpl-123"),
            ("WH_SO_COL_ALIASES", "Order No"),
        ]))
        .unwrap();
        assert_eq!(settings.doc_prefix, "INV");
        assert!(!settings.docs_enabled);
        assert_eq!(settings.policy.ship_per_order, Money::from_cents(3_500));
        assert_eq!(settings.policy.due_days, 7);
        assert_eq!(settings.orders_tab_names, vec!["Orders", "2025 Orders"]);
        assert_eq!(settings.ledger_scan_window, Some(500));
        assert_eq!(settings.template_for(DocType::SalesReceipt), Some("tmpl-123"));
        assert_eq!(settings.template_for(DocType::SalesInvoice), None);
        assert_eq!(settings.order_columns.so[0], "Order No");
    }

    #[test]
    fn fee_rules_combine_json_and_method_keys() {
        let settings = Settings::from_properties(&props(&[
            ("WH_FEE_RULES_JSON", r#"{"default": {"pct": 0, "flat": 0}, "wire": {"pct": 1.5, "flat": 5}}"#),
            ("WH_FEE_FLAT_WIRE", "10"),
            ("WH_FEE_PCT_CREDIT_CARD", "3%"),
            ("WH_FEE_FLAT_DEFAULT", "1"),
        ]))
        .unwrap();
        let fees = &settings.fees;

        let wire = fees.calc_fee("Wire", Money::from_cents(100_000));
        assert_eq!(wire.fee, Money::from_cents(2_500));

        let card = fees.calc_fee("credit-card", Money::from_cents(10_000));
        assert_eq!(card.fee, Money::from_cents(300));

        let cash = fees.calc_fee("cash", Money::from_cents(10_000));
        assert_eq!(cash.fee, Money::from_cents(100));
    }

    #[test]
    fn malformed_values_are_rejected() {
        for (key, value) in [
            ("WH_DUE_DAYS", "two"),
            ("WH_DOCS_ENABLED", "maybe"),
            ("WH_DEFAULT_SHIP_PER_ORDER", "abc"),
            ("WH_FEE_RULES_JSON", "{not json"),
            ("WH_FEE_PCT_WIRE", "-1"),
        ] {
            let err = Settings::from_properties(&props(&[(key, value)])).unwrap_err();
            assert!(err.to_string().contains(key), "{err}");
        }
    }
}
