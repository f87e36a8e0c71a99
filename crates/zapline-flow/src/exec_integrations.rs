//! External-service nodes: HTTP, SQL, Google, payments, commerce
//!
//! All of these branch `success`/`fail` (plus the api node's custom
//! routes). Failure is signaled by returning an error; the engine routes it
//! through the node's `fail` edge when one is wired, otherwise the
//! invocation ends and the session stays resumable.

use crate::engine::{ExecCtx, FlowEngine, StepOutcome};
use crate::exec_messaging::normalize_drive_url;
use crate::graph::FlowNode;
use crate::nodes::{DriveLookupVia, MediaForwardTarget, NodeConfig, ResponseMapping};
use crate::session::Session;
use crate::vars::{interpolate, json_path, VarValue};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use zapline_core::errors::{CoreError, CoreResult};
use zapline_whatsapp::{MediaRef, MessageEnvelope};

fn apply_mappings(session: &mut Session, mappings: &[ResponseMapping], response: &Value) {
    for mapping in mappings {
        match json_path(response, &mapping.path) {
            Some(value) => {
                session
                    .bag
                    .set(&mapping.variable, VarValue::from_json(value));
            }
            None => {
                debug!(path = %mapping.path, "response path did not resolve");
            }
        }
    }
}

pub(crate) async fn exec_api(
    engine: &FlowEngine,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::Api {
        url,
        method,
        headers,
        body,
        mappings,
        routes,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };

    let url = interpolate(url, &session.bag);
    let mut request = match method.to_uppercase().as_str() {
        "GET" => engine.http.get(&url),
        "POST" => engine.http.post(&url),
        "PUT" => engine.http.put(&url),
        "PATCH" => engine.http.patch(&url),
        "DELETE" => engine.http.delete(&url),
        other => {
            return Err(CoreError::validation(format!(
                "unsupported http method: {other}"
            )))
        }
    };
    for (key, value) in headers {
        request = request.header(key, interpolate(value, &session.bag));
    }
    if let Some(body) = body {
        let rendered = interpolate(body, &session.bag);
        request = match serde_json::from_str::<Value>(&rendered) {
            Ok(json) => request.json(&json),
            Err(_) => request
                .header("Content-Type", "text/plain")
                .body(rendered),
        };
    }

    let response = request
        .send()
        .await
        .map_err(|e| CoreError::transient(e.to_string()))?;
    let status = response.status();
    let payload: Value = response.json().await.unwrap_or(Value::Null);

    if !status.is_success() {
        return Err(CoreError::provider(format!(
            "api node got {}: {payload}",
            status.as_u16()
        )));
    }

    apply_mappings(session, mappings, &payload);

    // Custom routes are evaluated against the freshly mapped variables.
    for route in routes {
        let value = session
            .bag
            .resolve_path(&route.variable)
            .map(|v| v.render())
            .unwrap_or_default();
        let expected = interpolate(&route.value, &session.bag);
        if route.op.evaluate(&value, &expected) {
            return Ok(StepOutcome::Next(route.id.clone()));
        }
    }
    Ok(StepOutcome::Next("success".to_string()))
}

pub(crate) async fn exec_sql(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::Sql {
        query,
        params,
        mappings,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let params: Vec<Value> = params
        .iter()
        .map(|p| Value::String(interpolate(p, &session.bag)))
        .collect();
    let rows = engine.sql.query(ctx.tenant.id, query, &params).await?;

    // Mapping paths address the row set: `[0].name`, `[1].total`, ...
    let rows_value = Value::Array(rows);
    apply_mappings(session, mappings, &rows_value);
    Ok(StepOutcome::Next("success".to_string()))
}

pub(crate) async fn exec_google_sheet(
    engine: &FlowEngine,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::GoogleSheet {
        script_url,
        payload,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let body: serde_json::Map<String, Value> = payload
        .iter()
        .map(|(key, value)| {
            (
                key.clone(),
                Value::String(interpolate(value, &session.bag)),
            )
        })
        .collect();

    let response = engine
        .http
        .post(interpolate(script_url, &session.bag))
        .json(&Value::Object(body))
        .send()
        .await
        .map_err(|e| CoreError::transient(e.to_string()))?;
    if !response.status().is_success() {
        return Err(CoreError::provider(format!(
            "sheet append got {}",
            response.status().as_u16()
        )));
    }
    Ok(StepOutcome::next_default())
}

pub(crate) async fn exec_google_sheet_query(
    engine: &FlowEngine,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::GoogleSheetQuery {
        script_url,
        match_conditions,
        columns,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let query: Vec<(String, String)> = match_conditions
        .iter()
        .map(|(key, value)| (key.clone(), interpolate(value, &session.bag)))
        .collect();

    let response = engine
        .http
        .get(interpolate(script_url, &session.bag))
        .query(&query)
        .send()
        .await
        .map_err(|e| CoreError::transient(e.to_string()))?;
    if !response.status().is_success() {
        return Err(CoreError::provider(format!(
            "sheet query got {}",
            response.status().as_u16()
        )));
    }
    let payload: Value = response
        .json()
        .await
        .map_err(|e| CoreError::provider(e.to_string()))?;

    // Accept `{found, row: {...}}`, a bare row object, or an array of rows.
    let row = if let Some(row) = payload.get("row") {
        if payload
            .get("found")
            .and_then(Value::as_bool)
            .unwrap_or(true)
        {
            Some(row.clone())
        } else {
            None
        }
    } else if let Some(first) = payload.as_array().and_then(|rows| rows.first()) {
        Some(first.clone())
    } else if payload.is_object() {
        Some(payload.clone())
    } else {
        None
    };

    let Some(row) = row else {
        return Err(CoreError::not_found(
            "sheet row".to_string(),
            "query".to_string(),
        ));
    };
    apply_mappings(session, columns, &row);
    Ok(StepOutcome::Next("success".to_string()))
}

pub(crate) async fn exec_drive_image_lookup(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::DriveImageLookup {
        via,
        folder_id,
        file_name,
        target,
        auto_send,
        send_delay_secs,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };

    let urls: Vec<String> = match via {
        DriveLookupVia::ApiKey { api_key } => {
            let mut query_parts = Vec::new();
            if let Some(folder) = folder_id {
                query_parts.push(format!(
                    "'{}' in parents",
                    interpolate(folder, &session.bag)
                ));
            }
            if let Some(name) = file_name {
                query_parts.push(format!(
                    "name contains '{}'",
                    interpolate(name, &session.bag)
                ));
            }
            query_parts.push("mimeType contains 'image/'".to_string());
            let q = query_parts.join(" and ");

            let response = engine
                .http
                .get("https://www.googleapis.com/drive/v3/files")
                .query(&[("q", q.as_str()), ("key", api_key.as_str())])
                .send()
                .await
                .map_err(|e| CoreError::transient(e.to_string()))?;
            if !response.status().is_success() {
                return Err(CoreError::provider(format!(
                    "drive lookup got {}",
                    response.status().as_u16()
                )));
            }
            let payload: Value = response
                .json()
                .await
                .map_err(|e| CoreError::provider(e.to_string()))?;
            payload
                .get("files")
                .and_then(Value::as_array)
                .map(|files| {
                    files
                        .iter()
                        .filter_map(|f| f.get("id").and_then(Value::as_str))
                        .map(|id| {
                            format!("https://drive.google.com/uc?export=download&id={id}")
                        })
                        .collect()
                })
                .unwrap_or_default()
        }
        DriveLookupVia::Script { script_url } => {
            let mut query: Vec<(String, String)> = Vec::new();
            if let Some(folder) = folder_id {
                query.push(("folder".to_string(), interpolate(folder, &session.bag)));
            }
            if let Some(name) = file_name {
                query.push(("name".to_string(), interpolate(name, &session.bag)));
            }
            let response = engine
                .http
                .get(interpolate(script_url, &session.bag))
                .query(&query)
                .send()
                .await
                .map_err(|e| CoreError::transient(e.to_string()))?;
            let payload: Value = response
                .json()
                .await
                .map_err(|e| CoreError::provider(e.to_string()))?;
            match payload.get("urls").and_then(Value::as_array) {
                Some(urls) => urls
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                None => payload
                    .as_array()
                    .map(|urls| {
                        urls.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            }
        }
    };

    if urls.is_empty() {
        return Ok(StepOutcome::Next("not_found".to_string()));
    }

    session.bag.set(
        target,
        VarValue::Array(urls.iter().cloned().map(VarValue::from).collect()),
    );

    if *auto_send {
        let delay = (*send_delay_secs).min(engine.delay_cap());
        let last = urls.len() - 1;
        for (index, url) in urls.iter().enumerate() {
            let envelope = MessageEnvelope::Image {
                media: MediaRef::Link(normalize_drive_url(url)),
                caption: None,
            };
            engine
                .outbound
                .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
                .await?;
            if index != last && delay > 0 {
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
        }
    }
    Ok(StepOutcome::Next("found".to_string()))
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime.split(';').next().unwrap_or("") {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "audio/ogg" => "ogg",
        "audio/mpeg" => "mp3",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

pub(crate) async fn exec_media_forward(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::MediaForward { target } = &node.config else {
        return Err(CoreError::internal("node config mismatch"));
    };

    let Some(media_id) = ctx.record.media_id.clone() else {
        return Err(CoreError::validation(
            "media_forward needs an inbound media message",
        ));
    };
    let credentials = ctx.tenant.credentials();
    let info = engine.provider.media_url(&credentials, &media_id).await?;
    let bytes = engine.provider.download_media(&credentials, &info.url).await?;

    match target {
        MediaForwardTarget::Save { url_variable } => {
            let extension = extension_for_mime(&info.mime_type);
            let filename = format!("{}.{}", uuid::Uuid::new_v4(), extension);
            let path = engine.config.media_dir.join(&filename);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CoreError::internal(e.to_string()))?;
            }
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| CoreError::internal(e.to_string()))?;

            let public_url = format!(
                "{}/media/{filename}",
                engine.config.public_base_url.trim_end_matches('/')
            );
            session.bag.set(url_variable, VarValue::from(public_url));
        }
        MediaForwardTarget::Post {
            endpoint,
            field_name,
            mappings,
        } => {
            let part = reqwest::multipart::Part::bytes(bytes)
                .file_name(format!("media.{}", extension_for_mime(&info.mime_type)))
                .mime_str(&info.mime_type)
                .map_err(|e| CoreError::validation(e.to_string()))?;
            let form = reqwest::multipart::Form::new().part(field_name.clone(), part);

            let response = engine
                .http
                .post(interpolate(endpoint, &session.bag))
                .multipart(form)
                .send()
                .await
                .map_err(|e| CoreError::transient(e.to_string()))?;
            if !response.status().is_success() {
                return Err(CoreError::provider(format!(
                    "media upload got {}",
                    response.status().as_u16()
                )));
            }
            let payload: Value = response.json().await.unwrap_or(Value::Null);
            apply_mappings(session, mappings, &payload);
        }
    }
    Ok(StepOutcome::Next("success".to_string()))
}

pub(crate) async fn exec_payment(
    engine: &FlowEngine,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::Payment {
        provider,
        amount,
        currency,
        description,
        key_id,
        key_secret,
        message,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };

    let amount: i64 = interpolate(amount, &session.bag)
        .trim()
        .parse()
        .map_err(|_| CoreError::validation("payment amount is not a number"))?;
    let description = description
        .as_ref()
        .map(|d| interpolate(d, &session.bag))
        .unwrap_or_default();

    let payment_url = match provider {
        crate::nodes::PaymentProvider::Razorpay => {
            let body = serde_json::json!({
                "amount": amount,
                "currency": currency,
                "description": description,
            });
            let response = engine
                .http
                .post("https://api.razorpay.com/v1/payment_links")
                .basic_auth(key_id, Some(key_secret))
                .json(&body)
                .send()
                .await
                .map_err(|e| CoreError::transient(e.to_string()))?;
            if !response.status().is_success() {
                return Err(CoreError::provider(format!(
                    "razorpay got {}",
                    response.status().as_u16()
                )));
            }
            let payload: Value = response
                .json()
                .await
                .map_err(|e| CoreError::provider(e.to_string()))?;
            payload
                .get("short_url")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| CoreError::provider("razorpay response had no short_url"))?
        }
        crate::nodes::PaymentProvider::Stripe => {
            let form: Vec<(String, String)> = vec![
                ("mode".to_string(), "payment".to_string()),
                (
                    "line_items[0][price_data][currency]".to_string(),
                    currency.to_lowercase(),
                ),
                (
                    "line_items[0][price_data][product_data][name]".to_string(),
                    if description.is_empty() {
                        "Order".to_string()
                    } else {
                        description.clone()
                    },
                ),
                (
                    "line_items[0][price_data][unit_amount]".to_string(),
                    amount.to_string(),
                ),
                ("line_items[0][quantity]".to_string(), "1".to_string()),
                (
                    "success_url".to_string(),
                    format!(
                        "{}/payments/success",
                        engine.config.public_base_url.trim_end_matches('/')
                    ),
                ),
            ];
            let response = engine
                .http
                .post("https://api.stripe.com/v1/checkout/sessions")
                .basic_auth(key_secret, Option::<&str>::None)
                .form(&form)
                .send()
                .await
                .map_err(|e| CoreError::transient(e.to_string()))?;
            if !response.status().is_success() {
                return Err(CoreError::provider(format!(
                    "stripe got {}",
                    response.status().as_u16()
                )));
            }
            let payload: Value = response
                .json()
                .await
                .map_err(|e| CoreError::provider(e.to_string()))?;
            payload
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| CoreError::provider("stripe response had no url"))?
        }
    };

    session
        .bag
        .set("payment_url", VarValue::from(payment_url));
    let envelope = MessageEnvelope::Text {
        body: interpolate(message, &session.bag),
        preview_url: true,
    };
    engine
        .outbound
        .send_to_conversation(ctx.tenant, ctx.contact, ctx.conversation.id, &envelope)
        .await?;
    Ok(StepOutcome::Next("success".to_string()))
}

pub(crate) async fn exec_shopify(
    engine: &FlowEngine,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::Shopify {
        store_domain,
        api_token,
        order_number,
        mappings,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let order = interpolate(order_number, &session.bag);
    let url = format!(
        "https://{}/admin/api/2024-01/orders.json",
        store_domain.trim_end_matches('/')
    );

    let response = engine
        .http
        .get(&url)
        .header("X-Shopify-Access-Token", api_token)
        .query(&[
            ("name", format!("#{}", order.trim_start_matches('#'))),
            ("status", "any".to_string()),
        ])
        .send()
        .await
        .map_err(|e| CoreError::transient(e.to_string()))?;
    if !response.status().is_success() {
        return Err(CoreError::provider(format!(
            "shopify got {}",
            response.status().as_u16()
        )));
    }
    let payload: Value = response
        .json()
        .await
        .map_err(|e| CoreError::provider(e.to_string()))?;
    let Some(order_obj) = payload
        .get("orders")
        .and_then(Value::as_array)
        .and_then(|orders| orders.first())
        .cloned()
    else {
        return Err(CoreError::not_found("order".to_string(), order));
    };

    if mappings.is_empty() {
        store_default_order_fields(session, &order_obj, "financial_status", "total_price");
    } else {
        apply_mappings(session, mappings, &order_obj);
    }
    Ok(StepOutcome::Next("success".to_string()))
}

pub(crate) async fn exec_woocommerce(
    engine: &FlowEngine,
    session: &mut Session,
    node: &FlowNode,
) -> CoreResult<StepOutcome> {
    let NodeConfig::Woocommerce {
        site_url,
        consumer_key,
        consumer_secret,
        order_number,
        mappings,
    } = &node.config
    else {
        return Err(CoreError::internal("node config mismatch"));
    };
    let order = interpolate(order_number, &session.bag);
    let url = format!(
        "{}/wp-json/wc/v3/orders/{}",
        site_url.trim_end_matches('/'),
        order.trim().trim_start_matches('#')
    );

    let response = engine
        .http
        .get(&url)
        .basic_auth(consumer_key, Some(consumer_secret))
        .send()
        .await
        .map_err(|e| CoreError::transient(e.to_string()))?;
    if response.status().as_u16() == 404 {
        return Err(CoreError::not_found("order".to_string(), order));
    }
    if !response.status().is_success() {
        return Err(CoreError::provider(format!(
            "woocommerce got {}",
            response.status().as_u16()
        )));
    }
    let payload: Value = response
        .json()
        .await
        .map_err(|e| CoreError::provider(e.to_string()))?;

    if mappings.is_empty() {
        store_default_order_fields(session, &payload, "status", "total");
    } else {
        apply_mappings(session, mappings, &payload);
    }
    Ok(StepOutcome::Next("success".to_string()))
}

fn store_default_order_fields(
    session: &mut Session,
    order: &Value,
    status_key: &str,
    total_key: &str,
) {
    if let Some(id) = order.get("id") {
        session.bag.set("order_id", VarValue::from_json(id));
    }
    if let Some(status) = order.get(status_key) {
        session.bag.set("order_status", VarValue::from_json(status));
    } else {
        warn!("order response had no {status_key} field");
    }
    if let Some(total) = order.get(total_key) {
        session.bag.set("order_total", VarValue::from_json(total));
    }
}
