//! Domain strategies
//!
//! A strategy supplies built-in extractors for common semantic types and a
//! small vocabulary-driven rerank bonus. Strategies form a closed set; the
//! registry mapping configuration names to variants is built once.

use crate::application::use_cases::template_library::CompiledTemplate;
use crate::domain::domain_model::DomainModel;
use crate::domain::error::{AppError, Result};
use crate::domain::query_template::ParameterSpec;
use crate::domain::value_type::parse_date;
use chrono::{Duration, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

/// Upper bound on the bonus a strategy may add to a candidate.
pub const MAX_STRATEGY_BONUS: f32 = 0.05;

const ACTION_VERB_BONUS: f32 = 0.02;
const ENTITY_MENTION_BONUS: f32 = 0.02;
const EXTRACTABLE_PARAM_BONUS: f32 = 0.01;
const ORDER_TERM_BONUS: f32 = 0.02;
const NAME_VS_CITY_BONUS: f32 = 0.03;

fn ci(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| RegexBuilder::new(p).case_insensitive(true).build().unwrap())
        .collect()
}

fn cs(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

static IDENTIFIER: Lazy<Vec<Regex>> = Lazy::new(|| ci(&[r"(?:id|number|#)\s*(\d+)", r"\b(\d{4,})\b"]));

static ORDER_IDENTIFIER: Lazy<Vec<Regex>> = Lazy::new(|| {
    ci(&[
        r"order\s+(?:number\s+|#\s*|id\s+)?(\d+)",
        r"#\s*(\d+)",
        r"(?:order|id|number)\s+(\d+)",
        r"\b(\d{4,})\b",
    ])
});

static CUSTOMER_IDENTIFIER: Lazy<Vec<Regex>> = Lazy::new(|| {
    ci(&[
        r"customer\s+(?:number\s+|#\s*|id\s+)?(\d+)",
        r"customer\s*(\d{3,})",
        r"customer_id\s*(\d+)",
    ])
});

static MONETARY_AMOUNT: Lazy<Vec<Regex>> = Lazy::new(|| {
    ci(&[
        r"\$\s*(\d+(?:,\d{3})*(?:\.\d{2})?)",
        r"(\d+(?:,\d{3})*(?:\.\d{2})?)\s*(?:dollars?|usd)",
        r"(?:above|below|over|under|than|exceeds?|less than|greater than)\s+\$?\s*(\d+(?:,\d{3})*(?:\.\d{2})?)\b",
    ])
});

static DAYS_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*days?\b").unwrap());

static TIME_PERIOD_DAYS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ci(&[
        r"(?:last|past|previous|within)\s+(\d+)\s+days?",
        r"(\d+)\s+days?\s+(?:ago|back)",
        r"(?:in|within)\s+(?:the\s+)?(?:last|past)\s+(\d+)\s+days?",
    ])
});

static TIME_PERIOD_WEEKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ci(&[
        r"(?:last|past|previous|within)\s+(\d+)\s+weeks?",
        r"(\d+)\s+weeks?\s+(?:ago|back)",
    ])
});

static TIME_PERIOD_MONTHS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ci(&[
        r"(?:last|past|previous|within)\s+(\d+)\s+months?",
        r"(\d+)\s+months?\s+(?:ago|back)",
    ])
});

const DAYS_PER_WEEK: u32 = 7;
const DAYS_PER_MONTH: u32 = 30;

const TIME_PERIOD_WORDS: &[(&str, u32)] = &[
    ("today", 1),
    ("yesterday", 1),
    ("last week", 7),
    ("past week", 7),
    ("this week", 7),
    ("last month", 30),
    ("past month", 30),
    ("this month", 30),
    ("last quarter", 90),
    ("past quarter", 90),
    ("this quarter", 90),
    ("last year", 365),
    ("past year", 365),
    ("this year", 365),
];

static DATE_VALUE: Lazy<Vec<Regex>> = Lazy::new(|| {
    ci(&[
        r"\b(\d{4}-\d{2}-\d{2})\b",
        r"\b(\d{2}/\d{2}/\d{4})\b",
        r"\b(\d{2}-\d{2}-\d{4})\b",
        r"\b((?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4})\b",
    ])
});

static RELATIVE_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(today|yesterday|tomorrow)\b").unwrap());

static DATE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:from|between)\s+(.+?)\s+(?:to|and|through|until)\s+(.+)$").unwrap()
});

static ID_RANGE: Lazy<Vec<Regex>> = Lazy::new(|| {
    ci(&[
        r"\b(\d+)\s+(?:to|through|-)\s+(\d+)\b",
        r"between\s+(\d+)\s+and\s+(\d+)",
    ])
});

/// Ranges wider than this are passed on as their two endpoints.
const MAX_EXPANDED_ID_RANGE: u64 = 100;

static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).unwrap());

static CAPITALIZED_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)\b").unwrap());

static TITLED_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:\b(?:mr|mrs|ms|dr|prof)\.?)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)").unwrap()
});

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

static PHONE: Lazy<Vec<Regex>> = Lazy::new(|| {
    cs(&[
        r"\((\d{3})\)\s?(\d{3})[-.\s]?(\d{4})\b",
        r"\b(\d{3}[-.\s]?\d{3}[-.\s]?\d{4})\b",
    ])
});

static CITY: Lazy<Vec<Regex>> = Lazy::new(|| {
    cs(&[
        r"city\s+of\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)",
        r"located\s+in\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)",
        r"(?:in|from|at)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)(?:\s+city)?",
    ])
});

static COUNTRY: Lazy<Vec<Regex>> = Lazy::new(|| {
    cs(&[
        r"(?i:country)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)",
        r"(?i:from)\s+([A-Z][a-z]+)\s+(?i:customers?|orders?|users?)",
    ])
});

static QUANTITY: Lazy<Vec<Regex>> = Lazy::new(|| {
    ci(&[
        r"(\d+)\s*(?:units?|pieces?|items?|qty)",
        r"quantity\s+(?:of\s+)?(\d+)",
        r"(\d+)\s+(?:in\s+)?(?:stock|inventory|available)",
    ])
});

static PERCENTAGE: Lazy<Vec<Regex>> =
    Lazy::new(|| ci(&[r"(\d+(?:\.\d+)?)\s*%", r"(\d+(?:\.\d+)?)\s*percent"]));

const COMMON_STATUSES: &[&str] = &[
    "pending",
    "active",
    "completed",
    "cancelled",
    "failed",
    "processing",
    "shipped",
    "delivered",
    "approved",
    "rejected",
];

const ORDER_TERMS: &[&str] = &["order", "purchase", "transaction", "sale", "invoice"];
const PAYMENT_TERMS: &[&str] = &["payment", "pay", "paid", "credit", "debit", "card", "cash"];
const CITY_PHRASES: &[&str] = &["customers in", "users in", "clients in", "buyers in"];
const PERSON_TITLES: &[&str] = &["mr ", "mrs ", "ms ", "dr ", "prof ", "mr.", "mrs.", "ms.", "dr."];
const CITY_INDICATORS: &[&str] = &["city", "location", "located in", "customers from", "downtown"];
const CITY_NAME_EXCLUSIONS: &[&str] = &["new york", "san francisco", "los angeles"];

fn first_capture(patterns: &[Regex], query: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(query).and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string())
        })
    })
}

fn extract_identifier(query: &str) -> Option<String> {
    first_capture(&IDENTIFIER, query)
}

fn extract_order_identifier(query: &str) -> Option<String> {
    first_capture(&ORDER_IDENTIFIER, query)
}

fn extract_customer_identifier(query: &str) -> Option<String> {
    first_capture(&CUSTOMER_IDENTIFIER, query)
}

fn extract_monetary_amount(query: &str) -> Option<String> {
    for re in MONETARY_AMOUNT.iter() {
        for caps in re.captures_iter(query) {
            let Some(m) = caps.get(1) else { continue };
            // "over 30 days" is a period, not an amount.
            if DAYS_SUFFIX.is_match(&query[m.end()..]) {
                continue;
            }
            return Some(m.as_str().replace(',', ""));
        }
    }
    None
}

fn scaled_period(patterns: &[Regex], query: &str, factor: u32) -> Option<String> {
    first_capture(patterns, query)
        .and_then(|n| n.parse::<u32>().ok())
        .map(|n| (n * factor).to_string())
}

fn extract_time_period_days(query: &str) -> Option<String> {
    if let Some(days) = first_capture(&TIME_PERIOD_DAYS, query) {
        return Some(days);
    }
    if let Some(days) = scaled_period(&TIME_PERIOD_WEEKS, query, DAYS_PER_WEEK) {
        return Some(days);
    }
    if let Some(days) = scaled_period(&TIME_PERIOD_MONTHS, query, DAYS_PER_MONTH) {
        return Some(days);
    }
    let lower = query.to_lowercase();
    TIME_PERIOD_WORDS
        .iter()
        .find(|(phrase, _)| lower.contains(phrase))
        .map(|(_, days)| days.to_string())
}

/// Explicit dates are normalized to `YYYY-MM-DD`; relative days resolve against `today`.
fn extract_date_value_on(query: &str, today: NaiveDate) -> Option<String> {
    if let Some(raw) = first_capture(&DATE_VALUE, query) {
        return Some(
            parse_date(&raw)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or(raw),
        );
    }
    let word = RELATIVE_DAY.captures(query)?[1].to_lowercase();
    let date = match word.as_str() {
        "yesterday" => today - Duration::days(1),
        "tomorrow" => today + Duration::days(1),
        _ => today,
    };
    Some(date.format("%Y-%m-%d").to_string())
}

fn extract_date_value(query: &str) -> Option<String> {
    extract_date_value_on(query, Local::now().date_naive())
}

/// `start,end`, both sides normalized like single dates.
fn extract_date_range(query: &str) -> Option<String> {
    let caps = DATE_RANGE.captures(query)?;
    let start = extract_date_value(&caps[1])?;
    let end = extract_date_value(&caps[2])?;
    Some(format!("{},{}", start, end))
}

/// Comma-separated ids: an explicit list, an expanded range, or a single id.
fn extract_multiple_ids(query: &str, entity: &str) -> Option<String> {
    let entity = regex::escape(entity);
    let list = Regex::new(&format!(r"(?i){}s?\s+(\d+(?:\s*,\s*\d+)+)", entity)).ok()?;
    if let Some(caps) = list.captures(query) {
        return Some(caps[1].split_whitespace().collect());
    }

    for re in ID_RANGE.iter() {
        let Some(caps) = re.captures(query) else { continue };
        let (Ok(start), Ok(end)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>()) else {
            continue;
        };
        if start <= end && end - start <= MAX_EXPANDED_ID_RANGE {
            let ids: Vec<String> = (start..=end).map(|id| id.to_string()).collect();
            return Some(ids.join(","));
        }
        return Some(format!("{},{}", start, end));
    }

    let single = Regex::new(&format!(r"(?i){}s?\s+(?:number\s+|#\s*|id\s+)?(\d+)", entity)).ok()?;
    single.captures(query).map(|caps| caps[1].to_string())
}

fn extract_person_name(query: &str) -> Option<String> {
    if let Some(caps) = QUOTED.captures(query) {
        if let Some(name) = caps.get(1).or_else(|| caps.get(2)) {
            if name.as_str().contains(' ') {
                return Some(name.as_str().to_string());
            }
        }
    }
    for caps in CAPITALIZED_SPAN.captures_iter(query) {
        let name = &caps[1];
        let lower = name.to_lowercase();
        if !CITY_NAME_EXCLUSIONS.iter().any(|skip| lower.contains(skip)) {
            return Some(name.to_string());
        }
    }
    TITLED_NAME
        .captures(query)
        .map(|caps| caps[1].to_string())
}

fn extract_email(query: &str) -> Option<String> {
    EMAIL.find(query).map(|m| m.as_str().to_string())
}

fn extract_phone(query: &str) -> Option<String> {
    for re in PHONE.iter() {
        if let Some(caps) = re.captures(query) {
            let joined: String = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join("");
            if !joined.is_empty() {
                return Some(joined);
            }
        }
    }
    None
}

fn extract_city(query: &str) -> Option<String> {
    first_capture(&CITY, query)
}

fn extract_country(query: &str) -> Option<String> {
    first_capture(&COUNTRY, query)
}

fn extract_status(query: &str) -> Option<String> {
    let lower = query.to_lowercase();
    COMMON_STATUSES
        .iter()
        .find(|status| lower.contains(*status))
        .map(|s| s.to_string())
}

fn extract_quantity(query: &str) -> Option<String> {
    first_capture(&QUANTITY, query)
}

fn extract_percentage(query: &str) -> Option<String> {
    first_capture(&PERCENTAGE, query)
}

fn contains_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| text.contains(t))
}

fn looks_like_person_name(lower: &str) -> bool {
    if contains_any(lower, CITY_PHRASES) {
        return false;
    }
    contains_any(lower, PERSON_TITLES) || lower.contains("'s order") || lower.contains("'s purchase")
}

/// E-commerce parameters recognized by name regardless of semantic type.
fn extract_customer_order(query: &str, param: &ParameterSpec) -> Option<String> {
    let name = param.name.to_lowercase();
    if name.contains("order") && name.contains("ids") {
        return extract_multiple_ids(query, "order");
    }
    if name.contains("order") && (name.contains("id") || name.contains("number")) {
        return extract_order_identifier(query);
    }
    if name.contains("amount") {
        return extract_monetary_amount(query);
    }
    if name.contains("days") {
        return extract_time_period_days(query);
    }
    if name.contains("customer") && name.contains("id") {
        return extract_customer_identifier(query);
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainStrategy {
    Generic,
    CustomerOrder,
}

impl DomainStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            DomainStrategy::Generic => "generic",
            DomainStrategy::CustomerOrder => "customer_order",
        }
    }

    /// Configuration names that select this strategy.
    pub fn domain_names(&self) -> &'static [&'static str] {
        match self {
            DomainStrategy::Generic => &["generic"],
            DomainStrategy::CustomerOrder => &["customer_order", "e-commerce", "ecommerce"],
        }
    }

    /// Raw text for `semantic_type` found in `query`, if this strategy knows the type.
    pub fn extract_builtin(
        &self,
        semantic_type: &str,
        query: &str,
        param: &ParameterSpec,
    ) -> Option<String> {
        let wants_many = param.name.to_lowercase().contains("ids");
        match semantic_type {
            "identifier" | "id" => extract_identifier(query),
            "order_identifier" if wants_many => extract_multiple_ids(query, "order"),
            "order_identifier" => extract_order_identifier(query),
            "customer_identifier" => extract_customer_identifier(query),
            "monetary_amount" | "transaction_amount" | "amount" => extract_monetary_amount(query),
            "time_period_days" => extract_time_period_days(query),
            "date_value" | "date" => extract_date_value(query),
            "date_range" => extract_date_range(query),
            "person_name" => extract_person_name(query),
            "email_address" | "email" => extract_email(query),
            "phone_number" | "phone" => extract_phone(query),
            "city_name" | "city" => extract_city(query),
            "country_name" | "country" => extract_country(query),
            "status_value" | "status" | "enum_value" => extract_status(query),
            "quantity" => extract_quantity(query),
            "percentage" => extract_percentage(query),
            _ => None,
        }
    }

    /// Parameters recognized by name alone. Runs after every pattern the
    /// domain configures, so a field's own pattern always wins.
    pub fn extract_by_parameter_name(&self, query: &str, param: &ParameterSpec) -> Option<String> {
        match self {
            DomainStrategy::Generic => None,
            DomainStrategy::CustomerOrder => extract_customer_order(query, param),
        }
    }

    /// Vocabulary-driven rerank bonus, never above `MAX_STRATEGY_BONUS`.
    pub fn rerank_bonus(
        &self,
        template: &CompiledTemplate,
        query: &str,
        domain: &DomainModel,
    ) -> f32 {
        let lower = query.to_lowercase();
        let mut bonus = 0.0;

        if let Some(action) = template.semantic_tags.get("action") {
            if let Some(verbs) = domain.vocabulary.action_verbs.get(action) {
                if verbs.iter().any(|v| lower.contains(&v.to_lowercase())) {
                    bonus += ACTION_VERB_BONUS;
                }
            }
        }

        if let Some(entity) = template.semantic_tags.get("primary_entity") {
            if domain
                .entity_terms(entity)
                .iter()
                .any(|t| lower.contains(&t.to_lowercase()))
            {
                bonus += ENTITY_MENTION_BONUS;
            }
        }

        let extractable = template.parameters.iter().any(|p| {
            p.semantic_type
                .as_deref()
                .map(|st| self.extract_builtin(st, query, p).is_some())
                .unwrap_or(false)
        });
        if extractable {
            bonus += EXTRACTABLE_PARAM_BONUS;
        }

        if *self == DomainStrategy::CustomerOrder {
            let id = template.id.as_str();
            if id.contains("customer_name") && looks_like_person_name(&lower) {
                bonus += NAME_VS_CITY_BONUS;
            } else if id.contains("customer_city")
                && contains_any(&lower, CITY_INDICATORS)
                && !looks_like_person_name(&lower)
            {
                bonus += NAME_VS_CITY_BONUS;
            }
            if (id.contains("order") || id.contains("purchase")) && contains_any(&lower, ORDER_TERMS)
            {
                bonus += ORDER_TERM_BONUS;
            }
            if id.contains("payment") && contains_any(&lower, PAYMENT_TERMS) {
                bonus += ORDER_TERM_BONUS;
            }
        }

        f32::min(bonus, MAX_STRATEGY_BONUS)
    }
}

pub struct StrategyRegistry {
    by_name: HashMap<&'static str, DomainStrategy>,
}

static REGISTRY: Lazy<StrategyRegistry> = Lazy::new(StrategyRegistry::builtin);

impl StrategyRegistry {
    pub fn builtin() -> Self {
        let mut by_name = HashMap::new();
        for strategy in [DomainStrategy::Generic, DomainStrategy::CustomerOrder] {
            for name in strategy.domain_names() {
                by_name.insert(*name, strategy);
            }
        }
        Self { by_name }
    }

    pub fn global() -> &'static StrategyRegistry {
        &REGISTRY
    }

    pub fn resolve(&self, name: &str) -> Result<DomainStrategy> {
        self.by_name
            .get(name.trim().to_lowercase().as_str())
            .copied()
            .ok_or_else(|| {
                AppError::ConfigurationError(format!("Unknown domain strategy '{}'", name))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str) -> ParameterSpec {
        serde_json::from_value(serde_json::json!({"name": name})).unwrap()
    }

    #[test]
    fn test_registry_resolves_aliases() {
        let registry = StrategyRegistry::global();
        assert_eq!(registry.resolve("generic").unwrap(), DomainStrategy::Generic);
        assert_eq!(
            registry.resolve("E-Commerce").unwrap(),
            DomainStrategy::CustomerOrder
        );
        assert!(matches!(
            registry.resolve("astrology"),
            Err(AppError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_amount_skips_day_counts() {
        let s = DomainStrategy::Generic;
        let p = param("min_amount");
        assert_eq!(
            s.extract_builtin("monetary_amount", "orders over 30 days old", &p),
            None
        );
        assert_eq!(
            s.extract_builtin("monetary_amount", "orders over $1,250.50", &p),
            Some("1250.50".to_string())
        );
    }

    #[test]
    fn test_time_period_words() {
        let s = DomainStrategy::Generic;
        let p = param("days");
        assert_eq!(
            s.extract_builtin("time_period_days", "visits in the last 14 days", &p),
            Some("14".to_string())
        );
        assert_eq!(
            s.extract_builtin("time_period_days", "orders from last quarter", &p),
            Some("90".to_string())
        );
    }

    #[test]
    fn test_person_name_and_email() {
        let s = DomainStrategy::Generic;
        let p = param("name");
        assert_eq!(
            s.extract_builtin("person_name", "show records for Jane Doe please", &p),
            Some("Jane Doe".to_string())
        );
        assert_eq!(
            s.extract_builtin("email_address", "contact jane.doe@example.org now", &p),
            Some("jane.doe@example.org".to_string())
        );
        assert_eq!(
            s.extract_builtin("phone_number", "call (555) 123-4567", &p),
            Some("5551234567".to_string())
        );
    }

    #[test]
    fn test_customer_order_extracts_by_parameter_name() {
        let s = DomainStrategy::CustomerOrder;
        assert_eq!(
            s.extract_by_parameter_name("where is order #4521", &param("order_id")),
            Some("4521".to_string())
        );
        assert_eq!(
            DomainStrategy::Generic.extract_by_parameter_name("where is order #4521", &param("order_id")),
            None
        );
    }

    #[test]
    fn test_builtin_needs_a_known_semantic_type() {
        let s = DomainStrategy::CustomerOrder;
        assert_eq!(s.extract_builtin("", "where is order #4521", &param("order_id")), None);
        assert_eq!(s.extract_builtin("unknown", "where is order #4521", &param("order_id")), None);
    }

    #[test]
    fn test_week_and_month_periods_in_days() {
        let s = DomainStrategy::Generic;
        let p = param("days");
        assert_eq!(
            s.extract_builtin("time_period_days", "orders in the past 3 weeks", &p),
            Some("21".to_string())
        );
        assert_eq!(
            s.extract_builtin("time_period_days", "refunds from the last 2 months", &p),
            Some("60".to_string())
        );
        assert_eq!(
            s.extract_builtin("time_period_days", "orders from last week", &p),
            Some("7".to_string())
        );
        assert_eq!(
            s.extract_builtin("time_period_days", "sales last month", &p),
            Some("30".to_string())
        );
    }

    #[test]
    fn test_dates_are_normalized_and_relative_days_resolve() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            extract_date_value_on("visits on 03/01/2024", today),
            Some("2024-03-01".to_string())
        );
        assert_eq!(
            extract_date_value_on("what happened yesterday", today),
            Some("2024-03-04".to_string())
        );
        assert_eq!(
            extract_date_value_on("anything due tomorrow", today),
            Some("2024-03-06".to_string())
        );
        assert_eq!(extract_date_value_on("no date here", today), None);
    }

    #[test]
    fn test_date_range_has_both_ends() {
        let s = DomainStrategy::Generic;
        let p = param("period");
        assert_eq!(
            s.extract_builtin("date_range", "visits between 2024-01-01 and March 31, 2024", &p),
            Some("2024-01-01,2024-03-31".to_string())
        );
        assert_eq!(s.extract_builtin("date_range", "visits since 2024-01-01", &p), None);
    }

    #[test]
    fn test_multiple_order_ids() {
        let s = DomainStrategy::Generic;
        let p = param("order_ids");
        assert_eq!(
            s.extract_builtin("order_identifier", "show orders 12, 15 ,19", &p),
            Some("12,15,19".to_string())
        );
        assert_eq!(
            s.extract_builtin("order_identifier", "orders 5 to 8", &p),
            Some("5,6,7,8".to_string())
        );
        assert_eq!(
            s.extract_builtin("order_identifier", "orders between 1 and 5000", &p),
            Some("1,5000".to_string())
        );
        assert_eq!(
            DomainStrategy::CustomerOrder.extract_by_parameter_name("status of order 77", &p),
            Some("77".to_string())
        );
    }

    #[test]
    fn test_country_and_enum_value() {
        let s = DomainStrategy::Generic;
        let p = param("country");
        assert_eq!(
            s.extract_builtin("country_name", "revenue from Canada customers", &p),
            Some("Canada".to_string())
        );
        assert_eq!(
            s.extract_builtin("country_name", "users in country United Kingdom", &p),
            Some("United Kingdom".to_string())
        );
        assert_eq!(
            s.extract_builtin("enum_value", "list shipped orders", &param("status")),
            Some("shipped".to_string())
        );
    }
}
