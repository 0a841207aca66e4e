//! Quota ledger backed by the `users` table
//!
//! Checks never mutate counters. Commits are a single conditional UPDATE so a
//! request either lands on every dimension or on none of them, and two
//! concurrent commits for the same user cannot both push a counter past its
//! limit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::types::{
    aggregate, evaluate, Dimension, PlanLimits, PlanTable, PlanTier, QuotaDecision, UsageCounters,
    UsageDelta, UserAccount,
};
use crate::db::Database;
use crate::{Error, Result};

/// Per-user usage accounting against plan limits
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Load the account, creating it on the free plan if it does not exist yet
    async fn account(&self, user_id: &str) -> Result<UserAccount>;

    /// Decide whether every delta fits under the caller's plan. Never mutates.
    async fn check_and_reserve(&self, user_id: &str, deltas: &[UsageDelta]) -> Result<QuotaDecision>;

    /// Apply every delta, or none of them if any would exceed its limit
    async fn commit(&self, user_id: &str, deltas: &[UsageDelta]) -> Result<QuotaDecision>;

    /// Limits for a plan tier
    fn limits(&self, plan: PlanTier) -> PlanLimits;
}

/// SQLite implementation of [`QuotaLedger`]
pub struct SqliteQuotaLedger {
    db: Database,
    plans: PlanTable,
}

impl SqliteQuotaLedger {
    pub fn new(db: Database, plans: PlanTable) -> Self {
        Self { db, plans }
    }

    /// Move a user to another plan tier
    pub fn set_plan(&self, user_id: &str, plan: PlanTier) -> Result<UserAccount> {
        let period = current_period(Utc::now());
        self.db.with_conn(|conn| {
            load_or_create(conn, user_id, &period)?;
            conn.execute(
                "UPDATE users SET plan = ?2, updated_at = ?3 WHERE id = ?1",
                params![user_id, plan.as_str(), Utc::now().to_rfc3339()],
            )?;
            info!("User {} moved to plan {}", user_id, plan);
            load_or_create(conn, user_id, &period)
        })
    }
}

#[async_trait]
impl QuotaLedger for SqliteQuotaLedger {
    async fn account(&self, user_id: &str) -> Result<UserAccount> {
        let period = current_period(Utc::now());
        self.db.with_conn(|conn| load_or_create(conn, user_id, &period))
    }

    async fn check_and_reserve(&self, user_id: &str, deltas: &[UsageDelta]) -> Result<QuotaDecision> {
        validate_deltas(deltas)?;
        let account = self.account(user_id).await?;
        let decision = evaluate(&account.usage, deltas, &self.plans.limits(account.plan));

        if let QuotaDecision::Denied(denial) = decision {
            debug!(
                "Quota check denied for user {}: {} attempted {} of {}",
                user_id, denial.dimension, denial.attempted, denial.limit
            );
        }
        Ok(decision)
    }

    async fn commit(&self, user_id: &str, deltas: &[UsageDelta]) -> Result<QuotaDecision> {
        validate_deltas(deltas)?;
        let deltas = aggregate(deltas);
        if deltas.is_empty() {
            return Ok(QuotaDecision::Allowed);
        }

        let period = current_period(Utc::now());
        let plans = &self.plans;

        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let account = load_or_create(&tx, user_id, &period)?;
            let limits = plans.limits(account.plan);

            let mut sets = Vec::with_capacity(deltas.len());
            let mut conditions = Vec::with_capacity(deltas.len());
            let mut set_values = Vec::with_capacity(deltas.len());
            let mut condition_values = Vec::with_capacity(deltas.len() * 2);

            for delta in &deltas {
                let column = delta.dimension.column();
                sets.push(format!("{column} = {column} + ?"));
                set_values.push(Value::Real(delta.amount));
                conditions.push(format!("{column} + ? <= ?"));
                condition_values.push(Value::Real(delta.amount));
                condition_values.push(Value::Real(limits.get(delta.dimension)));
            }

            let sql = format!(
                "UPDATE users SET {}, updated_at = ? WHERE id = ? AND period = ? AND {}",
                sets.join(", "),
                conditions.join(" AND "),
            );

            let mut values = set_values;
            values.push(Value::Text(Utc::now().to_rfc3339()));
            values.push(Value::Text(user_id.to_string()));
            values.push(Value::Text(period.clone()));
            values.extend(condition_values);

            let updated = tx.execute(&sql, params_from_iter(values.iter()))?;
            if updated == 1 {
                tx.commit()?;
                debug!("Committed {} usage deltas for user {}", deltas.len(), user_id);
                return Ok(QuotaDecision::Allowed);
            }

            // Condition failed: report which dimension is now over its limit
            drop(tx);
            let account = load_or_create(conn, user_id, &period)?;
            match evaluate(&account.usage, &deltas, &limits) {
                QuotaDecision::Denied(denial) => {
                    warn!(
                        "Quota commit refused for user {}: {} attempted {} of {}",
                        user_id, denial.dimension, denial.attempted, denial.limit
                    );
                    Ok(QuotaDecision::Denied(denial))
                }
                QuotaDecision::Allowed => Err(Error::Other(format!(
                    "usage commit for user {} did not apply",
                    user_id
                ))),
            }
        })
    }

    fn limits(&self, plan: PlanTier) -> PlanLimits {
        self.plans.limits(plan)
    }
}

/// Billing period key for a timestamp (`YYYY-MM`, UTC)
pub fn current_period(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

fn validate_deltas(deltas: &[UsageDelta]) -> Result<()> {
    for delta in deltas {
        if !delta.amount.is_finite() || delta.amount < 0.0 {
            return Err(Error::InvalidValue(format!(
                "usage amount for {} must be a non-negative number, got {}",
                delta.dimension, delta.amount
            )));
        }
    }
    Ok(())
}

/// Create the account lazily and roll counters over when the period changed
fn load_or_create(conn: &Connection, user_id: &str, period: &str) -> Result<UserAccount> {
    let now = Utc::now().to_rfc3339();

    let created = conn.execute(
        "INSERT OR IGNORE INTO users (id, plan, period, created_at, updated_at)
         VALUES (?1, 'free', ?2, ?3, ?3)",
        params![user_id, period, now],
    )?;
    if created > 0 {
        info!("Created account for user {}", user_id);
    }

    let reset = Dimension::ALL
        .iter()
        .map(|d| format!("{} = 0", d.column()))
        .collect::<Vec<_>>()
        .join(", ");
    let rolled = conn.execute(
        &format!("UPDATE users SET {reset}, period = ?2, updated_at = ?3 WHERE id = ?1 AND period <> ?2"),
        params![user_id, period, now],
    )?;
    if rolled > 0 {
        info!("Usage counters reset for user {} (period {})", user_id, period);
    }

    let columns = Dimension::ALL
        .iter()
        .map(|d| d.column())
        .collect::<Vec<_>>()
        .join(", ");

    let row = conn
        .query_row(
            &format!("SELECT plan, period, created_at, updated_at, {columns} FROM users WHERE id = ?1"),
            params![user_id],
            |row| {
                let plan: String = row.get(0)?;
                let period: String = row.get(1)?;
                let created_at: String = row.get(2)?;
                let updated_at: String = row.get(3)?;
                let mut usage = UsageCounters::default();
                for (i, dimension) in Dimension::ALL.iter().enumerate() {
                    usage.set(*dimension, row.get(4 + i)?);
                }
                Ok((plan, period, created_at, updated_at, usage))
            },
        )
        .optional()?
        .ok_or_else(|| Error::Other(format!("account for user {} disappeared", user_id)))?;

    let (plan, period, created_at, updated_at, usage) = row;
    Ok(UserAccount {
        user_id: user_id.to_string(),
        plan: plan.parse()?,
        period,
        usage,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
