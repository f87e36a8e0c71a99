//! Control and data nodes: branching, variables, validation, timing

use crate::engine::{ExecCtx, FlowEngine, StepOutcome};
use crate::graph::{is_open, FlowNode};
use crate::nodes::{ConditionOp, NodeConfig, ValidatorKind};
use crate::session::{Session, TIMEOUT_OVERRIDE_VAR};
use crate::vars::{interpolate, references_last_input, VarValue};
use chrono::Utc;
use chrono_tz::Tz;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use zapline_core::errors::{CoreError, CoreResult};
use zapline_whatsapp::MessageEnvelope;

const LAST_SELECTION_VAR: &str = "_last_selection";

pub(crate) fn exec_start_trigger(
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::StartTrigger {
        keywords,
        accept_any,
        partial_match,
        case_sensitive,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };

    let input = session
        .bag
        .get("last_input")
        .map(VarValue::render)
        .unwrap_or_default();

    if *accept_any {
        return Ok(StepOutcome::next_default());
    }

    let haystack = if *case_sensitive {
        input.trim().to_string()
    } else {
        input.trim().to_uppercase()
    };
    for (index, keyword) in keywords.iter().enumerate() {
        let needle = if *case_sensitive {
            keyword.trim().to_string()
        } else {
            keyword.trim().to_uppercase()
        };
        let hit = if *partial_match {
            haystack.contains(&needle)
        } else {
            haystack == needle
        };
        if hit {
            session
                .bag
                .set("matched_keyword", VarValue::from(keyword.clone()));
            return Ok(StepOutcome::Next(format!("kw_{index}")));
        }
    }
    Ok(StepOutcome::next_default())
}

pub(crate) async fn resume_wait(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::Wait {
        expected_type,
        variable,
        retry_on_invalid,
        error_message,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };

    let accepted = expected_type.accepts(&ctx.inbound.message_type);
    if !accepted && *retry_on_invalid {
        let body = error_message
            .clone()
            .unwrap_or_else(|| "That doesn't look right, please try again.".to_string());
        let envelope = MessageEnvelope::Text {
            body: interpolate(&body, &session.bag),
            preview_url: false,
        };
        engine
            .outbound
            .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
            .await?;
        return Ok(StepOutcome::Suspend);
    }

    if let Some(variable) = variable {
        // Media inputs capture the resolved URL (or the media id when the
        // URL lookup failed); everything else captures the text.
        let captured = if ctx.inbound.is_text() || ctx.inbound.interactive_reply().is_some() {
            ctx.inbound.text_body().unwrap_or_default()
        } else {
            ctx.record
                .media_url
                .clone()
                .or_else(|| ctx.record.media_id.clone())
                .unwrap_or_else(|| ctx.inbound.text_body().unwrap_or_default())
        };
        session.bag.set(variable, VarValue::from(captured));
    }
    Ok(StepOutcome::next_default())
}

pub(crate) async fn exec_delay(engine: &FlowEngine, node: &FlowNode) -> CoreResult<StepOutcome> {
    let NodeConfig::Delay { seconds } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let capped = (*seconds).min(engine.delay_cap());
    if capped > 0 {
        tokio::time::sleep(Duration::from_secs(capped)).await;
    }
    Ok(StepOutcome::next_default())
}

pub(crate) fn exec_variable(session: &mut Session, node: &FlowNode) -> CoreResult<StepOutcome> {
    let NodeConfig::Variable { name, value } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let mut rendered = interpolate(value, &session.bag);

    // Rescue rule: a template built from last_input that resolved empty
    // falls back to the most recent interactive selection.
    if rendered.trim().is_empty() && references_last_input(value) {
        if let Some(selection) = session.bag.get(LAST_SELECTION_VAR) {
            rendered = selection.render();
        }
    }
    session.bag.set(name, VarValue::from(rendered));
    Ok(StepOutcome::next_default())
}

pub(crate) fn exec_list_variable(
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::ListVariable { name, value } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let rendered = interpolate(value, &session.bag);
    let items: Vec<VarValue> = rendered
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(VarValue::from)
        .collect();
    session.bag.set(name, VarValue::Array(items));
    Ok(StepOutcome::next_default())
}

pub(crate) async fn exec_update_contact(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::UpdateContact { name, email, labels } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let name = name.as_ref().map(|n| interpolate(n, &session.bag));
    let email = email.as_ref().map(|e| interpolate(e, &session.bag));
    let labels: Option<Vec<String>> = labels
        .as_ref()
        .map(|ls| ls.iter().map(|l| interpolate(l, &session.bag)).collect());
    engine
        .inbox
        .update_contact_fields(
            ctx.contact.id,
            name.as_deref(),
            email.as_deref(),
            labels.as_deref(),
        )
        .await?;
    Ok(StepOutcome::next_default())
}

pub(crate) fn exec_map(session: &mut Session, node: &FlowNode) -> CoreResult<StepOutcome> {
    let NodeConfig::Map {
        source,
        template,
        separator,
        target,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let Some(value) = session.bag.get(source).cloned() else {
        return Err(CoreError::validation(format!("map source {source} is not set")));
    };
    let Some(items) = value.as_array() else {
        return Err(CoreError::validation(format!(
            "map source {source} is not an array"
        )));
    };

    let mut parts = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        // Each element renders with `item`/`index` bound in a scratch copy.
        let mut scoped = session.bag.clone();
        scoped.set("item", item.clone());
        scoped.set("index", VarValue::Number(index as f64));
        parts.push(interpolate(template, &scoped));
    }
    session
        .bag
        .set(target, VarValue::from(parts.join(separator)));
    Ok(StepOutcome::next_default())
}

pub(crate) fn exec_condition(session: &mut Session, node: &FlowNode) -> CoreResult<StepOutcome> {
    let NodeConfig::Condition { left, op, right } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let left_value = interpolate(left, &session.bag);
    let right_value = interpolate(right, &session.bag);

    let verdict = match op {
        ConditionOp::Equals => left_value.trim() == right_value.trim(),
        ConditionOp::NotEquals => left_value.trim() != right_value.trim(),
        ConditionOp::Contains => left_value
            .to_lowercase()
            .contains(&right_value.trim().to_lowercase()),
        // Exists: the left side resolved to something non-empty that is not
        // the un-resolved token itself.
        ConditionOp::Exists => {
            !left_value.trim().is_empty() && left_value.trim() != left.trim()
        }
    };
    Ok(StepOutcome::Next(
        if verdict { "true" } else { "false" }.to_string(),
    ))
}

pub(crate) fn exec_router(session: &mut Session, node: &FlowNode) -> CoreResult<StepOutcome> {
    let NodeConfig::Router { variable, cases } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let value = session
        .bag
        .resolve_path(variable)
        .map(|v| v.render())
        .unwrap_or_default();
    for case in cases {
        let expected = interpolate(&case.value, &session.bag);
        if case.op.evaluate(&value, &expected) {
            return Ok(StepOutcome::Next(case.id.clone()));
        }
    }
    Ok(StepOutcome::next_default())
}

pub(crate) fn exec_keyword_match(
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::KeywordMatch {
        variable,
        keywords,
        case_sensitive,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let value = session
        .bag
        .resolve_path(variable)
        .map(|v| v.render())
        .unwrap_or_default();
    let haystack = if *case_sensitive {
        value
    } else {
        value.to_lowercase()
    };
    for case in keywords {
        let needle = if *case_sensitive {
            case.keyword.clone()
        } else {
            case.keyword.to_lowercase()
        };
        if haystack.contains(&needle) {
            return Ok(StepOutcome::Next(case.id.clone()));
        }
    }
    Ok(StepOutcome::next_default())
}

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
static PHONE_RE: OnceLock<Regex> = OnceLock::new();
static PAN_RE: OnceLock<Regex> = OnceLock::new();
static AADHAR_RE: OnceLock<Regex> = OnceLock::new();
static GST_RE: OnceLock<Regex> = OnceLock::new();
static PINCODE_RE: OnceLock<Regex> = OnceLock::new();

fn validator_matches(kind: ValidatorKind, value: &str) -> bool {
    let value = value.trim();
    match kind {
        ValidatorKind::Email => EMAIL_RE
            .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"))
            .is_match(value),
        ValidatorKind::Phone => PHONE_RE
            .get_or_init(|| Regex::new(r"^\+?[0-9]{10,15}$").expect("valid regex"))
            .is_match(value),
        ValidatorKind::Pan => PAN_RE
            .get_or_init(|| Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").expect("valid regex"))
            .is_match(value),
        ValidatorKind::Aadhar => AADHAR_RE
            .get_or_init(|| Regex::new(r"^[2-9][0-9]{11}$").expect("valid regex"))
            .is_match(&value.replace(' ', "")),
        ValidatorKind::Gst => GST_RE
            .get_or_init(|| {
                Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][0-9A-Z]Z[0-9A-Z]$")
                    .expect("valid regex")
            })
            .is_match(value),
        ValidatorKind::Pincode => PINCODE_RE
            .get_or_init(|| Regex::new(r"^[1-9][0-9]{5}$").expect("valid regex"))
            .is_match(value),
        // Image/Pdf validate the inbound message, not a string; handled in
        // exec_validator.
        ValidatorKind::Image | ValidatorKind::Pdf => false,
    }
}

pub(crate) fn exec_validator(
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::Validator { kind, value } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let valid = match kind {
        ValidatorKind::Image => ctx.inbound.message_type == "image",
        ValidatorKind::Pdf => {
            ctx.inbound.message_type == "document"
                && ctx
                    .inbound
                    .media()
                    .and_then(|m| m.mime_type.as_deref())
                    .map_or(false, |mime| mime.contains("pdf"))
        }
        other => validator_matches(*other, &interpolate(value, &session.bag)),
    };
    Ok(StepOutcome::Next(
        if valid { "valid" } else { "invalid" }.to_string(),
    ))
}

/// Country calling codes the parser classifies, longest prefix first.
const COUNTRY_PREFIXES: &[&str] = &[
    "971", "966", "880", "977", "94", "92", "91", "86", "81", "65", "61", "55", "49", "44", "33",
    "1",
];

pub(crate) fn exec_phone_parser(
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::PhoneParser { value } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let rendered = interpolate(value, &session.bag);
    let digits: String = rendered.chars().filter(|c| c.is_ascii_digit()).collect();

    for prefix in COUNTRY_PREFIXES {
        // A bare national number (10 digits) carries no country code.
        if digits.len() > 10 && digits.starts_with(prefix) {
            session
                .bag
                .set("phone_country_code", VarValue::from(prefix.to_string()));
            return Ok(StepOutcome::Next(format!("country_{prefix}")));
        }
    }
    Ok(StepOutcome::next_default())
}

pub(crate) fn exec_business_hours(node: &FlowNode) -> CoreResult<StepOutcome> {
    let NodeConfig::BusinessHours { timezone, schedule } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let open = match timezone.parse::<Tz>() {
        Ok(tz) => is_open(schedule, Utc::now(), tz),
        Err(_) => {
            return Err(CoreError::validation(format!(
                "unknown timezone: {timezone}"
            )))
        }
    };
    Ok(StepOutcome::Next(
        if open { "open" } else { "closed" }.to_string(),
    ))
}

pub(crate) fn exec_loop(session: &mut Session, node: &FlowNode) -> CoreResult<StepOutcome> {
    let NodeConfig::Loop {
        source,
        item_variable,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let index_var = format!("_loop_{}", node.id);
    let index = match session.bag.get(&index_var) {
        Some(VarValue::Number(n)) => *n as usize,
        _ => 0,
    };
    let Some(items) = session.bag.get(source).and_then(|v| v.as_array().map(<[VarValue]>::to_vec))
    else {
        return Err(CoreError::validation(format!(
            "loop source {source} is not an array"
        )));
    };

    if index < items.len() {
        session.bag.set(item_variable, items[index].clone());
        session
            .bag
            .set("loop_index", VarValue::Number(index as f64));
        session
            .bag
            .set(&index_var, VarValue::Number((index + 1) as f64));
        Ok(StepOutcome::Next("loop".to_string()))
    } else {
        session.bag.remove(&index_var);
        Ok(StepOutcome::Next("done".to_string()))
    }
}

pub(crate) fn exec_session_config(
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::SessionConfig { timeout_secs } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    session
        .bag
        .set(TIMEOUT_OVERRIDE_VAR, VarValue::Number(*timeout_secs as f64));
    Ok(StepOutcome::next_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_and_phone_validators() {
        assert!(validator_matches(ValidatorKind::Email, "a@b.co"));
        assert!(!validator_matches(ValidatorKind::Email, "not-an-email"));
        assert!(validator_matches(ValidatorKind::Phone, "+911234500001"));
        assert!(validator_matches(ValidatorKind::Phone, "9112345000"));
        assert!(!validator_matches(ValidatorKind::Phone, "12ab"));
    }

    #[test]
    fn indian_document_validators() {
        assert!(validator_matches(ValidatorKind::Pan, "ABCDE1234F"));
        assert!(!validator_matches(ValidatorKind::Pan, "abcde1234f"));
        assert!(validator_matches(ValidatorKind::Aadhar, "2123 4567 8901"));
        assert!(!validator_matches(ValidatorKind::Aadhar, "0123456789012"));
        assert!(validator_matches(ValidatorKind::Gst, "27ABCDE1234F1Z5"));
        assert!(!validator_matches(ValidatorKind::Gst, "27ABCDE1234F1X5"));
        assert!(validator_matches(ValidatorKind::Pincode, "400001"));
        assert!(!validator_matches(ValidatorKind::Pincode, "040001"));
    }
}
