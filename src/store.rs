use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{bson::doc, Client, Collection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schemas::{Expense, GroupMember, MemberId, Payer};

const MEMBERS: &str = "Members";
const EXPENSES: &str = "Expenses";
const EXPENSE_PAYERS: &str = "ExpensePayers";

#[derive(Clone, Debug, Deserialize, Serialize)]
struct ExpenseRecord {
    id: String,
    name: String,
    creator: MemberId,
    cost: Decimal,
    category: String,
    location: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
    receipt_url: Option<String>,
}

/// A member's share of one expense, stored apart from the expense itself.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct PayerRecord {
    expense_id: String,
    member_id: MemberId,
    amount: Decimal,
    is_creator: bool,
}

/// Members and expenses kept in MongoDB.
#[derive(Clone)]
pub struct Store {
    client: Client,
    database: String,
}

impl Store {
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            client,
            database: database.to_string(),
        })
    }

    fn collection<T>(&self, name: &str) -> Collection<T> {
        self.client.database(&self.database).collection(name)
    }

    pub async fn members(&self) -> Result<Vec<GroupMember>> {
        let cursor = self.collection::<GroupMember>(MEMBERS).find(None, None).await?;
        Ok(cursor.try_collect().await?)
    }

    /// Inserts or replaces the member with this id.
    pub async fn put_member(&self, member: GroupMember) -> Result<()> {
        let options = mongodb::options::ReplaceOptions::builder()
            .upsert(true)
            .build();
        self.collection::<GroupMember>(MEMBERS)
            .replace_one(doc! { "id": member.id.as_str() }, member.clone(), options)
            .await?;
        tracing::info!(member = %member.id, "member saved");
        Ok(())
    }

    /// Every expense with its shares attached, oldest first.
    pub async fn expenses(&self) -> Result<Vec<Expense>> {
        let options = mongodb::options::FindOptions::builder()
            .sort(doc! { "created_at": 1 })
            .build();
        let records: Vec<ExpenseRecord> = self
            .collection::<ExpenseRecord>(EXPENSES)
            .find(None, options)
            .await?
            .try_collect()
            .await?;
        let payer_records: Vec<PayerRecord> = self
            .collection::<PayerRecord>(EXPENSE_PAYERS)
            .find(None, None)
            .await?
            .try_collect()
            .await?;

        let mut payers_by_expense: HashMap<String, Vec<Payer>> = HashMap::new();
        for record in payer_records {
            payers_by_expense
                .entry(record.expense_id)
                .or_default()
                .push(Payer {
                    member_id: record.member_id,
                    amount: record.amount,
                    is_creator: record.is_creator,
                });
        }

        Ok(records
            .into_iter()
            .map(|record| Expense {
                payers: payers_by_expense.remove(&record.id).unwrap_or_default(),
                id: record.id,
                name: record.name,
                creator: record.creator,
                cost: record.cost,
                category: record.category,
                location: record.location,
                created_at: record.created_at,
                receipt_url: record.receipt_url,
            })
            .collect())
    }

    /// Stores the expense row, then one share row per payer.
    pub async fn insert_expense(&self, expense: &Expense) -> Result<()> {
        let record = ExpenseRecord {
            id: expense.id.clone(),
            name: expense.name.clone(),
            creator: expense.creator.clone(),
            cost: expense.cost,
            category: expense.category.clone(),
            location: expense.location.clone(),
            created_at: expense.created_at,
            receipt_url: expense.receipt_url.clone(),
        };
        self.collection::<ExpenseRecord>(EXPENSES)
            .insert_one(record, None)
            .await?;

        if !expense.payers.is_empty() {
            let payers = expense.payers.iter().map(|payer| PayerRecord {
                expense_id: expense.id.clone(),
                member_id: payer.member_id.clone(),
                amount: payer.amount,
                is_creator: payer.is_creator,
            });
            self.collection::<PayerRecord>(EXPENSE_PAYERS)
                .insert_many(payers, None)
                .await?;
        }
        tracing::info!(expense = %expense.id, payers = expense.payers.len(), "expense saved");
        Ok(())
    }
}
