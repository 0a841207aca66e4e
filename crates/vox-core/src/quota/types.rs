//! Quota type definitions: dimensions, plan tiers, limits and check results

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// A metered resource dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Characters,
    Generations,
    TranscriptionMinutes,
    Transcriptions,
    SoundEffects,
    VoiceIsolations,
    VoiceIsolationMinutes,
    VoiceConversions,
    VoiceConversionMinutes,
    DialogueGenerations,
    DialogueCharacters,
    ClonedVoices,
}

impl Dimension {
    /// Every dimension, in storage column order
    pub const ALL: [Dimension; 12] = [
        Dimension::Characters,
        Dimension::Generations,
        Dimension::TranscriptionMinutes,
        Dimension::Transcriptions,
        Dimension::SoundEffects,
        Dimension::VoiceIsolations,
        Dimension::VoiceIsolationMinutes,
        Dimension::VoiceConversions,
        Dimension::VoiceConversionMinutes,
        Dimension::DialogueGenerations,
        Dimension::DialogueCharacters,
        Dimension::ClonedVoices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Characters => "characters",
            Self::Generations => "generations",
            Self::TranscriptionMinutes => "transcription_minutes",
            Self::Transcriptions => "transcriptions",
            Self::SoundEffects => "sound_effects",
            Self::VoiceIsolations => "voice_isolations",
            Self::VoiceIsolationMinutes => "voice_isolation_minutes",
            Self::VoiceConversions => "voice_conversions",
            Self::VoiceConversionMinutes => "voice_conversion_minutes",
            Self::DialogueGenerations => "dialogue_generations",
            Self::DialogueCharacters => "dialogue_characters",
            Self::ClonedVoices => "cloned_voices",
        }
    }

    /// Counter column in the `users` table
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Characters => "characters_used",
            Self::Generations => "generations_used",
            Self::TranscriptionMinutes => "transcription_minutes_used",
            Self::Transcriptions => "transcriptions_used",
            Self::SoundEffects => "sound_effects_used",
            Self::VoiceIsolations => "voice_isolations_used",
            Self::VoiceIsolationMinutes => "voice_isolation_minutes_used",
            Self::VoiceConversions => "voice_conversions_used",
            Self::VoiceConversionMinutes => "voice_conversion_minutes_used",
            Self::DialogueGenerations => "dialogue_generations_used",
            Self::DialogueCharacters => "dialogue_characters_used",
            Self::ClonedVoices => "cloned_voices_used",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| Error::InvalidValue(format!("unknown usage dimension: {}", s)))
    }
}

/// Subscription plan tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Starter,
    Creator,
    Pro,
}

impl PlanTier {
    pub const ALL: [PlanTier; 4] = [
        PlanTier::Free,
        PlanTier::Starter,
        PlanTier::Creator,
        PlanTier::Pro,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Creator => "creator",
            Self::Pro => "pro",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "creator" => Ok(Self::Creator),
            "pro" => Ok(Self::Pro),
            other => Err(Error::InvalidValue(format!("unknown plan tier: {}", other))),
        }
    }
}

/// A requested unit of consumption on one dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageDelta {
    pub dimension: Dimension,
    pub amount: f64,
}

impl UsageDelta {
    pub fn new(dimension: Dimension, amount: f64) -> Self {
        Self { dimension, amount }
    }

    /// A single slot (one generation, one transcription, ...)
    pub fn one(dimension: Dimension) -> Self {
        Self::new(dimension, 1.0)
    }
}

/// Usage counters for one billing period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageCounters(BTreeMap<Dimension, f64>);

impl UsageCounters {
    pub fn get(&self, dimension: Dimension) -> f64 {
        self.0.get(&dimension).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        self.0.insert(dimension, value);
    }

    pub fn add(&mut self, dimension: Dimension, amount: f64) {
        *self.0.entry(dimension).or_insert(0.0) += amount;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        self.0.iter().map(|(d, v)| (*d, *v))
    }
}

/// Per-dimension limits for one plan tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanLimits(BTreeMap<Dimension, f64>);

impl PlanLimits {
    pub fn from_pairs(pairs: &[(Dimension, f64)]) -> Self {
        Self(pairs.iter().copied().collect())
    }

    /// Limit for a dimension; dimensions without an entry allow nothing
    pub fn get(&self, dimension: Dimension) -> f64 {
        self.0.get(&dimension).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, dimension: Dimension, limit: f64) {
        self.0.insert(dimension, limit);
    }
}

/// Static plan limit table keyed by tier and dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTable(BTreeMap<PlanTier, PlanLimits>);

impl PlanTable {
    pub fn limits(&self, tier: PlanTier) -> PlanLimits {
        self.0.get(&tier).cloned().unwrap_or_default()
    }

    pub fn limit(&self, tier: PlanTier, dimension: Dimension) -> f64 {
        self.0
            .get(&tier)
            .map(|limits| limits.get(dimension))
            .unwrap_or(0.0)
    }

    /// Override a single entry
    pub fn set(&mut self, tier: PlanTier, dimension: Dimension, limit: f64) {
        self.0.entry(tier).or_default().set(dimension, limit);
    }
}

impl Default for PlanTable {
    fn default() -> Self {
        use Dimension::*;

        // Columns: free, starter, creator, pro
        let rows: [(Dimension, [f64; 4]); 12] = [
            (Characters, [10_000.0, 30_000.0, 40_000.0, 50_000.0]),
            (Generations, [10.0, 30.0, 60.0, 100.0]),
            (TranscriptionMinutes, [30.0, 120.0, 300.0, 600.0]),
            (Transcriptions, [10.0, 50.0, 100.0, 200.0]),
            (SoundEffects, [10.0, 50.0, 100.0, 200.0]),
            (VoiceIsolations, [5.0, 25.0, 50.0, 100.0]),
            (VoiceIsolationMinutes, [10.0, 60.0, 150.0, 300.0]),
            (VoiceConversions, [5.0, 25.0, 50.0, 100.0]),
            (VoiceConversionMinutes, [10.0, 60.0, 150.0, 300.0]),
            (DialogueGenerations, [5.0, 25.0, 50.0, 100.0]),
            (DialogueCharacters, [5_000.0, 20_000.0, 40_000.0, 80_000.0]),
            (ClonedVoices, [0.0, 1.0, 3.0, 10.0]),
        ];

        let mut table = Self(BTreeMap::new());
        for (dimension, limits) in rows {
            for (tier, limit) in PlanTier::ALL.iter().zip(limits) {
                table.set(*tier, dimension, limit);
            }
        }
        table
    }
}

/// The breached dimension of a denied request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaDenial {
    pub dimension: Dimension,
    pub attempted: f64,
    pub limit: f64,
}

/// Result of a quota check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuotaDecision {
    Allowed,
    Denied(QuotaDenial),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// A user account with its plan and current-period usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: String,
    pub plan: PlanTier,
    /// Billing period (`YYYY-MM`, UTC)
    pub period: String,
    pub usage: UsageCounters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Check every delta against the plan limits without mutating anything.
///
/// Deltas are checked in order and the first breach is reported. Repeated
/// dimensions accumulate, so `[chars 5, chars 10]` is checked as 15.
pub fn evaluate(usage: &UsageCounters, deltas: &[UsageDelta], limits: &PlanLimits) -> QuotaDecision {
    let mut pending = UsageCounters::default();

    for delta in deltas {
        pending.add(delta.dimension, delta.amount);
        let attempted = usage.get(delta.dimension) + pending.get(delta.dimension);
        let limit = limits.get(delta.dimension);
        if attempted > limit {
            return QuotaDecision::Denied(QuotaDenial {
                dimension: delta.dimension,
                attempted,
                limit,
            });
        }
    }

    QuotaDecision::Allowed
}

/// Collapse repeated dimensions while keeping first-seen order
pub(crate) fn aggregate(deltas: &[UsageDelta]) -> Vec<UsageDelta> {
    let mut merged: Vec<UsageDelta> = Vec::new();
    for delta in deltas {
        match merged.iter_mut().find(|d| d.dimension == delta.dimension) {
            Some(existing) => existing.amount += delta.amount,
            None => merged.push(*delta),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_usage(chars: f64, generations: f64) -> UsageCounters {
        let mut usage = UsageCounters::default();
        usage.set(Dimension::Characters, chars);
        usage.set(Dimension::Generations, generations);
        usage
    }

    #[test]
    fn test_dimension_round_trip_names() {
        for dimension in Dimension::ALL {
            assert_eq!(dimension.as_str().parse::<Dimension>().unwrap(), dimension);
        }
        assert!("tokens".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_plan_tier_parse_is_case_insensitive() {
        assert_eq!("PRO".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert_eq!(PlanTier::default(), PlanTier::Free);
        assert!("enterprise".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_default_plan_table() {
        let table = PlanTable::default();
        assert_eq!(table.limit(PlanTier::Free, Dimension::Characters), 10_000.0);
        assert_eq!(table.limit(PlanTier::Free, Dimension::Generations), 10.0);
        assert_eq!(table.limit(PlanTier::Pro, Dimension::Characters), 50_000.0);
        assert_eq!(table.limit(PlanTier::Pro, Dimension::Generations), 100.0);
        assert_eq!(table.limit(PlanTier::Free, Dimension::ClonedVoices), 0.0);
    }

    #[test]
    fn test_evaluate_allows_up_to_limit() {
        let limits = PlanTable::default().limits(PlanTier::Free);
        let usage = free_usage(9_990.0, 5.0);

        let decision = evaluate(&usage, &[UsageDelta::new(Dimension::Characters, 5.0)], &limits);
        assert_eq!(decision, QuotaDecision::Allowed);

        let decision = evaluate(&usage, &[UsageDelta::new(Dimension::Characters, 10.0)], &limits);
        assert_eq!(decision, QuotaDecision::Allowed);
    }

    #[test]
    fn test_evaluate_denies_with_attempted_and_limit() {
        let limits = PlanTable::default().limits(PlanTier::Free);
        let usage = free_usage(9_990.0, 5.0);

        let decision = evaluate(&usage, &[UsageDelta::new(Dimension::Characters, 20.0)], &limits);
        assert_eq!(
            decision,
            QuotaDecision::Denied(QuotaDenial {
                dimension: Dimension::Characters,
                attempted: 10_010.0,
                limit: 10_000.0,
            })
        );
    }

    #[test]
    fn test_evaluate_reports_first_breached_dimension() {
        let limits = PlanTable::default().limits(PlanTier::Free);
        let mut usage = UsageCounters::default();
        usage.set(Dimension::DialogueGenerations, 5.0);

        let decision = evaluate(
            &usage,
            &[
                UsageDelta::one(Dimension::DialogueGenerations),
                UsageDelta::new(Dimension::DialogueCharacters, 400.0),
            ],
            &limits,
        );

        match decision {
            QuotaDecision::Denied(denial) => {
                assert_eq!(denial.dimension, Dimension::DialogueGenerations);
                assert_eq!(denial.attempted, 6.0);
                assert_eq!(denial.limit, 5.0);
            }
            QuotaDecision::Allowed => panic!("expected denial"),
        }
    }

    #[test]
    fn test_evaluate_accumulates_repeated_dimensions() {
        let limits = PlanLimits::from_pairs(&[(Dimension::Characters, 100.0)]);
        let usage = UsageCounters::default();

        let decision = evaluate(
            &usage,
            &[
                UsageDelta::new(Dimension::Characters, 60.0),
                UsageDelta::new(Dimension::Characters, 60.0),
            ],
            &limits,
        );
        assert!(!decision.is_allowed());
    }

    #[test]
    fn test_aggregate_keeps_order() {
        let merged = aggregate(&[
            UsageDelta::one(Dimension::Generations),
            UsageDelta::new(Dimension::Characters, 3.0),
            UsageDelta::new(Dimension::Characters, 4.0),
        ]);
        assert_eq!(
            merged,
            vec![
                UsageDelta::one(Dimension::Generations),
                UsageDelta::new(Dimension::Characters, 7.0),
            ]
        );
    }
}
