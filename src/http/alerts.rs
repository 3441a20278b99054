//! `/alerts/*` handlers (`spec.md` Sec. 6 "Alert rules & events"), CRUD on
//! rules plus event listing/acknowledgement, all session-authenticated and
//! owner-scoped.

use super::extract::SessionUser;
use super::state::AppState;
use crate::db::alert_events::AlertEvent;
use crate::db::alert_rules::{AlertRule, Comparison, Metric, NewAlertRule};
use crate::error::{ApiError, ApiResult};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct RuleView {
    id: i64,
    name: String,
    metric: String,
    comparison: String,
    threshold_pct: f64,
    trigger_after: i64,
    created_at: String,
    updated_at: String,
}

impl From<AlertRule> for RuleView {
    fn from(r: AlertRule) -> Self {
        RuleView {
            id: r.id,
            name: r.name,
            metric: r.metric.as_str().to_string(),
            comparison: r.comparison.as_str().to_string(),
            threshold_pct: r.threshold_pct,
            trigger_after: r.trigger_after,
            created_at: super::iso8601(r.created_at),
            updated_at: super::iso8601(r.updated_at),
        }
    }
}

#[derive(Deserialize)]
pub struct RuleBody {
    name: String,
    metric: String,
    comparison: String,
    threshold_pct: f64,
    trigger_after: i64,
}

fn parse_rule(body: RuleBody) -> ApiResult<NewAlertRule> {
    let metric = Metric::parse(&body.metric)
        .ok_or_else(|| ApiError::Invalid(format!("unknown metric: {}", body.metric)))?;
    let comparison = Comparison::parse(&body.comparison)
        .ok_or_else(|| ApiError::Invalid(format!("unknown comparison: {}", body.comparison)))?;
    if body.trigger_after < 1 {
        return Err(ApiError::Invalid("trigger_after must be at least 1".into()));
    }
    Ok(NewAlertRule {
        name: body.name,
        metric,
        comparison,
        threshold_pct: body.threshold_pct,
        trigger_after: body.trigger_after,
    })
}

pub async fn list_rules(State(state): State<AppState>, SessionUser(user): SessionUser) -> ApiResult<Json<Vec<RuleView>>> {
    let rules = state.db.alert_rules().list_by_user(user.id).await?;
    Ok(Json(rules.into_iter().map(RuleView::from).collect()))
}

pub async fn create_rule(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Json(body): Json<RuleBody>,
) -> ApiResult<(StatusCode, Json<RuleView>)> {
    let rule = parse_rule(body)?;
    let created = state.db.alert_rules().create(user.id, rule).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn update_rule(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
    Json(body): Json<RuleBody>,
) -> ApiResult<Json<RuleView>> {
    let rule = parse_rule(body)?;
    let updated = state.db.alert_rules().update(id, user.id, rule).await?;
    Ok(Json(updated.into()))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.db.alert_rules().delete(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct EventView {
    id: i64,
    rule_id: i64,
    machine_id: i64,
    value: f64,
    triggered_at: String,
    acknowledged: bool,
    acknowledged_at: Option<String>,
}

impl From<AlertEvent> for EventView {
    fn from(e: AlertEvent) -> Self {
        EventView {
            id: e.id,
            rule_id: e.rule_id,
            machine_id: e.machine_id,
            value: e.value,
            triggered_at: super::iso8601(e.triggered_at),
            acknowledged: e.acknowledged,
            acknowledged_at: e.acknowledged_at.map(super::iso8601),
        }
    }
}

pub async fn list_events(State(state): State<AppState>, SessionUser(user): SessionUser) -> ApiResult<Json<Vec<EventView>>> {
    let events = state.db.alert_events().list_by_user(user.id).await?;
    Ok(Json(events.into_iter().map(EventView::from).collect()))
}

pub async fn acknowledge_event(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.db.alert_events().acknowledge(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
