//! Message-producing nodes: text, media, interactive, catalog, hand-off

use crate::engine::{ExecCtx, FlowEngine, StepOutcome};
use crate::graph::FlowNode;
use crate::nodes::{ListSource, NodeConfig};
use crate::session::Session;
use crate::vars::{interpolate, VarValue};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;
use zapline_core::errors::{CoreError, CoreResult};
use zapline_whatsapp::{ListRow, ListSection, MediaRef, MessageEnvelope, ProductSection, ReplyButton};

/// WhatsApp caps reply buttons at 3 per message.
const MAX_BUTTONS: usize = 3;

/// Rows shown per list page; overflow gets synthetic nav rows.
const LIST_PAGE_SIZE: usize = 9;

const PENDING_BUTTONS_VAR: &str = "_pending_buttons";
const LIST_ROWS_VAR: &str = "_list_rows";
const LIST_PAGE_VAR: &str = "_list_page";
const LAST_SELECTION_VAR: &str = "_last_selection";

pub(crate) async fn exec_message(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::Message { text } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let envelope = MessageEnvelope::Text {
        body: interpolate(text, &session.bag),
        preview_url: false,
    };
    engine
        .outbound
        .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
        .await?;
    Ok(StepOutcome::next_default())
}

/// Rewrite Google Drive share links into direct-download form; other URLs
/// pass through untouched.
pub(crate) fn normalize_drive_url(url: &str) -> String {
    if !url.contains("drive.google.com") {
        return url.to_string();
    }
    // https://drive.google.com/file/d/<ID>/view?... style links.
    if let Some(rest) = url.split("/file/d/").nth(1) {
        if let Some(id) = rest.split(['/', '?']).next() {
            if !id.is_empty() {
                return format!("https://drive.google.com/uc?export=download&id={id}");
            }
        }
    }
    // https://drive.google.com/open?id=<ID> style links.
    if let Some(rest) = url.split("id=").nth(1) {
        if let Some(id) = rest.split('&').next() {
            if !id.is_empty() {
                return format!("https://drive.google.com/uc?export=download&id={id}");
            }
        }
    }
    url.to_string()
}

fn media_ref(
    url: &Option<String>,
    media_id: &Option<String>,
    session: &Session,
) -> CoreResult<MediaRef> {
    if let Some(url) = url.as_deref().filter(|u| !u.trim().is_empty()) {
        let resolved = interpolate(url, &session.bag);
        let normalized = normalize_drive_url(resolved.trim());
        zapline_whatsapp::validate_media_url(&normalized)
            .map_err(|e| CoreError::validation(e.to_string()))?;
        return Ok(MediaRef::Link(normalized));
    }
    if let Some(id) = media_id.as_deref().filter(|i| !i.trim().is_empty()) {
        return Ok(MediaRef::Id(interpolate(id, &session.bag)));
    }
    Err(CoreError::validation("media node has neither url nor media id"))
}

pub(crate) async fn exec_media(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let envelope = match &node.config {
        NodeConfig::Image { url, media_id, caption } => MessageEnvelope::Image {
            media: media_ref(url, media_id, session)?,
            caption: caption.as_ref().map(|c| interpolate(c, &session.bag)),
        },
        NodeConfig::Video { url, media_id, caption } => MessageEnvelope::Video {
            media: media_ref(url, media_id, session)?,
            caption: caption.as_ref().map(|c| interpolate(c, &session.bag)),
        },
        NodeConfig::Document {
            url,
            media_id,
            caption,
            filename,
        } => MessageEnvelope::Document {
            media: media_ref(url, media_id, session)?,
            caption: caption.as_ref().map(|c| interpolate(c, &session.bag)),
            filename: filename.clone(),
        },
        _ => return Err(CoreError::internal("node config mismatch")),
    };
    engine
        .outbound
        .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
        .await?;
    Ok(StepOutcome::next_default())
}

fn button_objects(buttons: &[ReplyButton]) -> VarValue {
    VarValue::Array(
        buttons
            .iter()
            .map(|b| {
                let mut map = BTreeMap::new();
                map.insert("id".to_string(), VarValue::from(b.id.clone()));
                map.insert("title".to_string(), VarValue::from(b.title.clone()));
                VarValue::Object(map)
            })
            .collect(),
    )
}

fn send_buttons_prompt(
    session: &Session,
    node: &FlowNode,
) -> CoreResult<(MessageEnvelope, Vec<ReplyButton>)> {
    let NodeConfig::Button {
        text,
        header,
        footer,
        buttons,
        ..
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let rendered: Vec<ReplyButton> = buttons
        .iter()
        .take(MAX_BUTTONS)
        .map(|b| ReplyButton {
            id: b.id.clone(),
            title: interpolate(&b.title, &session.bag),
        })
        .collect();
    let envelope = MessageEnvelope::Buttons {
        body: interpolate(text, &session.bag),
        header: header.clone(),
        footer: footer.clone(),
        buttons: rendered.clone(),
    };
    Ok((envelope, rendered))
}

pub(crate) async fn exec_button(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let (envelope, rendered) = send_buttons_prompt(session, node)?;
    engine
        .outbound
        .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
        .await?;
    session.bag.set(PENDING_BUTTONS_VAR, button_objects(&rendered));
    Ok(StepOutcome::Suspend)
}

pub(crate) async fn resume_button(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::Button {
        retry_on_invalid,
        retry_message,
        ..
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };

    let pending: Vec<(String, String)> = session
        .bag
        .get(PENDING_BUTTONS_VAR)
        .and_then(|v| v.as_array().map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    VarValue::Object(map) => {
                        let id = map.get("id")?.render();
                        let title = map.get("title")?.render();
                        Some((id, title))
                    }
                    _ => None,
                })
                .collect()
        }))
        .unwrap_or_default();

    // Prefer the structured reply; fall back to matching typed text
    // against ids and titles.
    let reply = ctx.inbound.interactive_reply();
    let (reply_id, reply_title) = match reply {
        Some(reply) => (Some(reply.id.clone()), Some(reply.title.clone())),
        None => (None, ctx.inbound.text_body()),
    };

    let matched = pending.iter().enumerate().find(|(_, (id, title))| {
        if let Some(reply_id) = &reply_id {
            if id == reply_id {
                return true;
            }
        }
        if let Some(text) = &reply_title {
            if title.eq_ignore_ascii_case(text.trim()) {
                return true;
            }
        }
        false
    });

    match matched {
        Some((index, (_, title))) => {
            session
                .bag
                .set("selected_button", VarValue::from(title.clone()));
            session
                .bag
                .set(LAST_SELECTION_VAR, VarValue::from(title.clone()));
            session.bag.remove(PENDING_BUTTONS_VAR);
            Ok(StepOutcome::Next(format!("btn_{index}")))
        }
        None if *retry_on_invalid => {
            if let Some(message) = retry_message {
                let envelope = MessageEnvelope::Text {
                    body: interpolate(message, &session.bag),
                    preview_url: false,
                };
                engine
                    .outbound
                    .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
                    .await?;
            } else {
                let (envelope, _) = send_buttons_prompt(session, node)?;
                engine
                    .outbound
                    .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
                    .await?;
            }
            Ok(StepOutcome::Suspend)
        }
        None => {
            session.bag.remove(PENDING_BUTTONS_VAR);
            Ok(StepOutcome::next_default())
        }
    }
}

/// A resolved list row before pagination.
#[derive(Debug, Clone)]
struct ResolvedRow {
    id: String,
    title: String,
    description: Option<String>,
}

impl ResolvedRow {
    fn to_var(&self) -> VarValue {
        let mut map = BTreeMap::new();
        map.insert("id".to_string(), VarValue::from(self.id.clone()));
        map.insert("title".to_string(), VarValue::from(self.title.clone()));
        if let Some(description) = &self.description {
            map.insert(
                "description".to_string(),
                VarValue::from(description.clone()),
            );
        }
        VarValue::Object(map)
    }

    fn from_var(value: &VarValue) -> Option<Self> {
        match value {
            VarValue::Object(map) => Some(Self {
                id: map.get("id")?.render(),
                title: map.get("title")?.render(),
                description: map.get("description").map(VarValue::render),
            }),
            _ => None,
        }
    }
}

async fn build_rows(
    engine: &FlowEngine,
    session: &Session,
    source: &ListSource,
) -> CoreResult<Vec<ResolvedRow>> {
    match source {
        ListSource::Inline { sections } => Ok(sections
            .iter()
            .flat_map(|section| section.rows.iter())
            .map(|row| ResolvedRow {
                id: row.id.clone(),
                title: interpolate(&row.title, &session.bag),
                description: row.description.as_ref().map(|d| interpolate(d, &session.bag)),
            })
            .collect()),
        ListSource::Variable { name } => {
            let Some(value) = session.bag.get(name) else {
                return Err(CoreError::validation(format!(
                    "list source variable {name} is not set"
                )));
            };
            let Some(items) = value.as_array() else {
                return Err(CoreError::validation(format!(
                    "list source variable {name} is not an array"
                )));
            };
            Ok(items
                .iter()
                .enumerate()
                .map(|(index, item)| match item {
                    VarValue::Object(map) => ResolvedRow {
                        id: map
                            .get("id")
                            .map(VarValue::render)
                            .unwrap_or_else(|| format!("row_{index}")),
                        title: map
                            .get("title")
                            .map(VarValue::render)
                            .unwrap_or_else(|| format!("Item {}", index + 1)),
                        description: map.get("description").map(VarValue::render),
                    },
                    other => ResolvedRow {
                        id: format!("row_{index}"),
                        title: other.render(),
                        description: None,
                    },
                })
                .collect())
        }
        ListSource::GoogleSheet {
            script_url,
            title_column,
            description_column,
        } => {
            let url = interpolate(script_url, &session.bag);
            let response = engine
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| CoreError::transient(e.to_string()))?;
            let rows: Vec<serde_json::Value> = response
                .json()
                .await
                .map_err(|e| CoreError::provider(e.to_string()))?;
            let title_key = title_column.as_deref().unwrap_or("title");
            Ok(rows
                .iter()
                .enumerate()
                .map(|(index, row)| ResolvedRow {
                    id: row
                        .get("id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("row_{index}")),
                    title: row
                        .get(title_key)
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Item {}", index + 1)),
                    description: description_column
                        .as_deref()
                        .and_then(|key| row.get(key))
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                })
                .collect())
        }
    }
}

/// One page of rows plus nav entries. Original ids are preserved across
/// pages; only the synthetic `__next`/`__prev` rows are added.
fn page_rows(rows: &[ResolvedRow], page: usize) -> Vec<ListRow> {
    let total_pages = rows.len().div_ceil(LIST_PAGE_SIZE).max(1);
    let page = page.min(total_pages - 1);
    let start = page * LIST_PAGE_SIZE;
    let end = (start + LIST_PAGE_SIZE).min(rows.len());

    let mut out: Vec<ListRow> = rows[start..end]
        .iter()
        .map(|row| ListRow {
            id: row.id.clone(),
            title: truncate(&row.title, 24),
            description: row.description.clone(),
        })
        .collect();
    if page > 0 {
        out.insert(
            0,
            ListRow {
                id: "__prev".to_string(),
                title: "Back".to_string(),
                description: None,
            },
        );
    }
    if end < rows.len() {
        out.push(ListRow {
            id: "__next".to_string(),
            title: "Next".to_string(),
            description: None,
        });
    }
    out
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        value.chars().take(max).collect()
    }
}

async fn send_list_page(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &Session,
    node: &FlowNode,
    rows: &[ResolvedRow],
    page: usize,
) -> CoreResult<()> {
    let NodeConfig::List {
        text,
        header,
        button_label,
        ..
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let envelope = MessageEnvelope::List {
        body: interpolate(text, &session.bag),
        header: header.clone(),
        footer: None,
        button_label: button_label.clone(),
        sections: vec![ListSection {
            title: "Options".to_string(),
            rows: page_rows(rows, page),
        }],
    };
    engine
        .outbound
        .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
        .await?;
    Ok(())
}

pub(crate) async fn exec_list(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::List { source, .. } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let rows = build_rows(engine, session, source).await?;
    if rows.is_empty() {
        return Err(CoreError::validation("list node produced no rows"));
    }
    send_list_page(engine, ctx, session, node, &rows, 0).await?;
    session.bag.set(
        LIST_ROWS_VAR,
        VarValue::Array(rows.iter().map(ResolvedRow::to_var).collect()),
    );
    session.bag.set(LIST_PAGE_VAR, VarValue::Number(0.0));
    Ok(StepOutcome::Suspend)
}

pub(crate) async fn resume_list(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let rows: Vec<ResolvedRow> = session
        .bag
        .get(LIST_ROWS_VAR)
        .and_then(|v| v.as_array().map(|items| {
            items.iter().filter_map(ResolvedRow::from_var).collect()
        }))
        .unwrap_or_default();
    let page = match session.bag.get(LIST_PAGE_VAR) {
        Some(VarValue::Number(n)) => *n as usize,
        _ => 0,
    };

    // Metadata reply id wins; typed text falls back to a title match.
    let reply = ctx.inbound.interactive_reply();
    let selected_id = match reply {
        Some(reply) => Some(reply.id.clone()),
        None => ctx.inbound.text_body().and_then(|text| {
            rows.iter()
                .find(|row| row.title.eq_ignore_ascii_case(text.trim()))
                .map(|row| row.id.clone())
        }),
    };

    match selected_id.as_deref() {
        Some("__next") => {
            let next_page = page + 1;
            send_list_page(engine, ctx, session, node, &rows, next_page).await?;
            session
                .bag
                .set(LIST_PAGE_VAR, VarValue::Number(next_page as f64));
            Ok(StepOutcome::Suspend)
        }
        Some("__prev") => {
            let prev_page = page.saturating_sub(1);
            send_list_page(engine, ctx, session, node, &rows, prev_page).await?;
            session
                .bag
                .set(LIST_PAGE_VAR, VarValue::Number(prev_page as f64));
            Ok(StepOutcome::Suspend)
        }
        Some(id) => {
            let row = rows.iter().find(|row| row.id == id);
            let title = row
                .map(|row| row.title.clone())
                .or_else(|| reply.map(|r| r.title.clone()))
                .unwrap_or_else(|| id.to_string());
            session
                .bag
                .set("selected_list_id", VarValue::from(id.to_string()));
            session
                .bag
                .set("selected_list_title", VarValue::from(title.clone()));
            session.bag.set(LAST_SELECTION_VAR, VarValue::from(title));
            session.bag.remove(LIST_ROWS_VAR);
            session.bag.remove(LIST_PAGE_VAR);
            Ok(StepOutcome::Next(id.to_string()))
        }
        None => {
            // Not a selection at all; re-prompt the current page.
            send_list_page(engine, ctx, session, node, &rows, page).await?;
            Ok(StepOutcome::Suspend)
        }
    }
}

pub(crate) async fn exec_flow(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::Flow {
        text,
        flow_id,
        cta,
        screen,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let envelope = MessageEnvelope::Flow {
        body: interpolate(text, &session.bag),
        header: None,
        footer: None,
        flow_id: flow_id.clone(),
        flow_cta: cta.clone(),
        flow_token: Some(session.id.to_string()),
        screen: screen.clone(),
    };
    engine
        .outbound
        .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
        .await?;
    Ok(StepOutcome::Suspend)
}

pub(crate) async fn resume_flow(
    _engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    _node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let Some(nfm) = ctx.inbound.nfm_reply() else {
        // Not a form submission; keep waiting.
        return Ok(StepOutcome::Suspend);
    };
    match serde_json::from_str::<serde_json::Value>(&nfm.response_json) {
        Ok(serde_json::Value::Object(fields)) => {
            for (key, value) in fields {
                // flow_token is plumbing, not user data.
                if key == "flow_token" {
                    continue;
                }
                session.bag.set(&key, VarValue::from_json(&value));
            }
        }
        Ok(_) | Err(_) => {
            warn!("nfm_reply carried non-object response_json");
        }
    }
    Ok(StepOutcome::next_default())
}

pub(crate) async fn exec_send_external(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::SendExternal { phone, text } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let to = interpolate(phone, &session.bag);
    let envelope = MessageEnvelope::Text {
        body: interpolate(text, &session.bag),
        preview_url: false,
    };
    engine.outbound.send_raw(ctx.tenant, to.trim(), &envelope).await?;
    Ok(StepOutcome::next_default())
}

pub(crate) async fn exec_catalogue(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::Catalogue {
        header,
        body,
        catalog_id,
        sections,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let envelope = MessageEnvelope::Catalog {
        header: header.clone(),
        body: interpolate(body, &session.bag),
        catalog_id: catalog_id.clone(),
        sections: sections
            .iter()
            .map(|section| ProductSection {
                title: section.title.clone(),
                product_retailer_ids: section.product_ids.clone(),
            })
            .collect(),
    };
    engine
        .outbound
        .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
        .await?;
    Ok(StepOutcome::next_default())
}

pub(crate) async fn exec_group_images(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::GroupImages {
        source,
        delay_secs,
        caption,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let urls: Vec<String> = session
        .bag
        .get(source)
        .and_then(|v| v.as_array().map(|items| {
            items.iter().map(VarValue::render).collect()
        }))
        .unwrap_or_default();
    if urls.is_empty() {
        return Err(CoreError::validation(format!(
            "group_images source {source} is empty"
        )));
    }

    let delay = (*delay_secs).min(engine.delay_cap());
    let last = urls.len() - 1;
    for (index, url) in urls.iter().enumerate() {
        let envelope = MessageEnvelope::Image {
            media: MediaRef::Link(normalize_drive_url(url.trim())),
            // The caption rides on the final image only.
            caption: if index == last {
                caption.as_ref().map(|c| interpolate(c, &session.bag))
            } else {
                None
            },
        };
        engine
            .outbound
            .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
            .await?;
        if index != last && delay > 0 {
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
    }
    Ok(StepOutcome::next_default())
}

pub(crate) async fn exec_agent(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::Agent { message } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };
    if let Some(message) = message {
        let envelope = MessageEnvelope::Text {
            body: interpolate(message, &session.bag),
            preview_url: false,
        };
        engine
            .outbound
            .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
            .await?;
    }
    engine.inbox.handoff_to_agent(ctx.conversation.id).await?;
    Ok(StepOutcome::Terminate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_share_links_normalize() {
        assert_eq!(
            normalize_drive_url("https://drive.google.com/file/d/1AbC_def/view?usp=sharing"),
            "https://drive.google.com/uc?export=download&id=1AbC_def"
        );
        assert_eq!(
            normalize_drive_url("https://drive.google.com/open?id=XYZ9"),
            "https://drive.google.com/uc?export=download&id=XYZ9"
        );
        assert_eq!(
            normalize_drive_url("https://example.com/a.jpg"),
            "https://example.com/a.jpg"
        );
    }

    fn rows(n: usize) -> Vec<ResolvedRow> {
        (0..n)
            .map(|i| ResolvedRow {
                id: format!("row_{i}"),
                title: format!("Item {}", i + 1),
                description: None,
            })
            .collect()
    }

    #[test]
    fn first_page_gets_next_row_only() {
        let paged = page_rows(&rows(14), 0);
        assert_eq!(paged.len(), 10);
        assert_eq!(paged[0].id, "row_0");
        assert_eq!(paged[8].id, "row_8");
        assert_eq!(paged[9].id, "__next");
    }

    #[test]
    fn second_page_gets_prev_and_original_ids() {
        let paged = page_rows(&rows(14), 1);
        assert_eq!(paged[0].id, "__prev");
        // Items 10..14 keep their original ids.
        assert_eq!(paged[1].id, "row_9");
        assert_eq!(paged.last().unwrap().id, "row_13");
        assert!(!paged.iter().any(|r| r.id == "__next"));
    }

    #[test]
    fn small_list_has_no_nav_rows() {
        let paged = page_rows(&rows(4), 0);
        assert_eq!(paged.len(), 4);
        assert!(!paged.iter().any(|r| r.id.starts_with("__")));
    }
}
