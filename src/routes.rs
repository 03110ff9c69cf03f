use actix_web::{get, post, put, web, HttpResponse};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::balance::compute_balances;
use crate::currency::CurrencyConverter;
use crate::error::{Result, SplitError, ValidationErrors};
use crate::exchange::get_settlement_plan;
use crate::form::{ExpenseDraft, FormRules, SubmissionStatus};
use crate::ledger::{DebtLedger, LedgerOutcome};
use crate::schemas::{Expense, ExpenseSummary, GroupMember};
use crate::split::split_equally;
use crate::store::Store;

#[derive(Deserialize)]
struct MemberJson {
    full_name: String,
    email: String,
}

#[derive(Deserialize)]
struct ComputeJson {
    members: Vec<GroupMember>,
    expenses: Vec<Expense>,
    #[serde(default)]
    reconcile: bool,
}

#[derive(Deserialize)]
struct SplitJson {
    total: Decimal,
    count: usize,
}

async fn load_ledger(store: &Store) -> Result<LedgerOutcome> {
    let members = store.members().await?;
    let expenses = store.expenses().await?;
    DebtLedger::build(&expenses, &members)
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[get("/members")]
async fn get_members(store: web::Data<Store>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(store.members().await?))
}

#[put("/members/{id}")]
async fn put_member(
    store: web::Data<Store>,
    id: web::Path<String>,
    json: web::Json<MemberJson>,
) -> Result<HttpResponse> {
    let json = json.into_inner();
    let member = GroupMember {
        id: id.into_inner(),
        full_name: json.full_name,
        email: json.email,
    };
    store.put_member(member.clone()).await?;
    Ok(HttpResponse::Ok().json(member))
}

#[get("/expenses")]
async fn get_expenses(store: web::Data<Store>) -> Result<HttpResponse> {
    let members = store.members().await?;
    let summaries = store
        .expenses()
        .await?
        .into_iter()
        .map(|expense| {
            let creator_name = members
                .iter()
                .find(|m| m.id == expense.creator)
                .map(|m| m.full_name.clone());
            if creator_name.is_none() {
                tracing::warn!(expense = %expense.id, creator = %expense.creator, "creator is not a member");
            }
            ExpenseSummary {
                expense,
                creator_name,
            }
        })
        .collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(summaries))
}

#[post("/expenses")]
async fn add_expense(
    store: web::Data<Store>,
    rules: web::Data<FormRules>,
    converter: web::Data<CurrencyConverter>,
    draft: web::Json<ExpenseDraft>,
) -> Result<HttpResponse> {
    let draft = draft.into_inner();
    let mut status = SubmissionStatus::default();

    // The receipt itself goes straight to blob storage; we only get its URL
    if draft.attachment.is_some() {
        status = status.start_upload()?;
        if draft.receipt_url.is_none() {
            status = status.fail("receipt was not uploaded")?;
            tracing::warn!(%status, "expense rejected");
            let mut errors = ValidationErrors::new();
            errors.add("attachment", "Receipt upload did not return a URL");
            return Err(SplitError::Validation(errors));
        }
    }
    status = status.start_saving()?;

    let saved = async {
        let roster = store.members().await?;
        let id = bson::oid::ObjectId::new().to_hex();
        let expense = draft.into_expense(&rules, &converter, &roster, id, Utc::now())?;
        store.insert_expense(&expense).await?;
        Ok::<_, SplitError>(expense)
    }
    .await;

    match saved {
        Ok(expense) => {
            let status = status.succeed()?;
            tracing::info!(expense = %expense.id, cost = %expense.cost, "expense added");
            Ok(HttpResponse::Created().json(json!({
                "submission": status,
                "expense": expense
            })))
        }
        Err(err) => {
            let status = status.fail(err.to_string())?;
            tracing::warn!(%status, "failed to add expense: {err}");
            Err(err)
        }
    }
}

#[get("/ledger")]
async fn get_ledger(store: web::Data<Store>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(load_ledger(&store).await?))
}

#[get("/ledger/reconciled")]
async fn get_reconciled_ledger(store: web::Data<Store>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(load_ledger(&store).await?.reconciled()))
}

#[get("/balance")]
async fn get_balance(store: web::Data<Store>) -> Result<HttpResponse> {
    let outcome = load_ledger(&store).await?;
    Ok(HttpResponse::Ok().json(compute_balances(&outcome.matrix)?))
}

#[get("/exchanges")]
async fn get_exchanges(store: web::Data<Store>) -> Result<HttpResponse> {
    let outcome = load_ledger(&store).await?;
    Ok(HttpResponse::Ok().json(get_settlement_plan(&outcome.matrix)?))
}

#[post("/ledger/compute")]
async fn compute_ledger(json: web::Json<ComputeJson>) -> Result<HttpResponse> {
    let ComputeJson {
        members,
        expenses,
        reconcile,
    } = json.into_inner();
    let mut outcome = DebtLedger::build(&expenses, &members)?;
    if reconcile {
        outcome = outcome.reconciled();
    }
    Ok(HttpResponse::Ok().json(outcome))
}

#[post("/split")]
async fn split(json: web::Json<SplitJson>) -> Result<HttpResponse> {
    let shares = split_equally(json.total, json.count)?;
    Ok(HttpResponse::Ok().json(json!({ "shares": shares })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(get_members)
        .service(put_member)
        .service(get_expenses)
        .service(add_expense)
        .service(get_reconciled_ledger)
        .service(get_ledger)
        .service(get_balance)
        .service(get_exchanges)
        .service(compute_ledger)
        .service(split);
}
