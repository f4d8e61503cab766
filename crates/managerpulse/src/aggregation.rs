//! Recomputes the per-company aggregate from its reviews.

use crate::domain::{Choice, CompanyAggregate, Confidence, EntityKind, Review};
use crate::scoring::mean_of_present;
use crate::store::{self, aggregates, dispatch, with_retry, Conn, Database, RetryConfig, StoreError};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Thresholds used when deriving confidence, tags and publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationPolicy {
    /// Contributors needed for medium confidence.
    pub medium_confidence_at: i64,
    /// Contributors needed for high confidence.
    pub high_confidence_at: i64,
    /// Below this many contributors an aggregate is never publishable.
    pub min_publishable: i64,
    pub top_tag_count: usize,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            medium_confidence_at: 3,
            high_confidence_at: 10,
            min_publishable: 3,
            top_tag_count: 5,
        }
    }
}

impl AggregationPolicy {
    pub fn confidence_for(&self, n_contributors: i64) -> Confidence {
        if n_contributors >= self.high_confidence_at {
            Confidence::High
        } else if n_contributors >= self.medium_confidence_at {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Derived values for one company, before they are written.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateStats {
    pub company_id: i64,
    pub n_contributors: i64,
    pub averages: [Option<f64>; 5],
    pub confidence: Confidence,
    pub top_tags: Option<String>,
}

pub fn summarize(company_id: i64, reviews: &[Review], policy: &AggregationPolicy) -> AggregateStats {
    let n_contributors = reviews.len() as i64;
    let averages: [Option<f64>; 5] = std::array::from_fn(|index| {
        mean_of_present(
            reviews
                .iter()
                .map(|review| review.ratings()[index].map(|rating| rating as f64)),
        )
    });

    AggregateStats {
        company_id,
        n_contributors,
        averages,
        confidence: policy.confidence_for(n_contributors),
        top_tags: top_tags(reviews, policy.top_tag_count),
    }
}

/// Most frequent tags across reviews, ties broken alphabetically.
fn top_tags(reviews: &[Review], limit: usize) -> Option<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for tag in reviews.iter().flat_map(Review::tag_list) {
        *counts.entry(tag).or_default() += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|(left_tag, left), (right_tag, right)| {
        right.cmp(left).then_with(|| left_tag.cmp(right_tag))
    });
    let tags: Vec<String> = ranked.into_iter().take(limit).map(|(tag, _)| tag).collect();

    if tags.is_empty() {
        None
    } else {
        Some(tags.join(", "))
    }
}

/// Recomputes one company's aggregate on the given connection. Callers wrap
/// this in a transaction so the review read and the write agree.
#[instrument(skip(conn, policy))]
pub async fn recompute_company(
    conn: &mut Conn,
    company_id: i64,
    policy: &AggregationPolicy,
) -> Result<CompanyAggregate, StoreError> {
    if !store::exists(conn, EntityKind::Company, company_id).await? {
        return Err(StoreError::NotFound {
            entity: EntityKind::Company,
            id: company_id,
        });
    }

    let reviews = Review::for_company(conn, company_id).await?;
    let stats = summarize(company_id, &reviews, policy);
    let aggregate = aggregates::upsert_stats(conn, &stats, policy.min_publishable).await?;

    info!(
        company_id,
        n_contributors = aggregate.n_contributors,
        confidence = %aggregate.confidence.as_str(),
        "aggregate recomputed"
    );
    Ok(aggregate)
}

/// Recomputes the given companies, each in its own transaction. A
/// transaction that loses a race with a concurrent writer is run again.
pub async fn recompute_companies(
    db: &Database,
    company_ids: &[i64],
    policy: &AggregationPolicy,
) -> Result<Vec<CompanyAggregate>, StoreError> {
    let retry = RetryConfig::default();
    let mut results = Vec::with_capacity(company_ids.len());
    for &company_id in company_ids {
        let aggregate = with_retry(&retry, || async move {
            let mut tx = db.begin().await?;
            let aggregate = recompute_company(&mut tx, company_id, policy).await?;
            tx.commit().await?;
            Ok::<_, StoreError>(aggregate)
        })
        .await?;
        results.push(aggregate);
    }
    Ok(results)
}

pub async fn recompute_all(db: &Database, policy: &AggregationPolicy) -> Result<Vec<CompanyAggregate>, StoreError> {
    let company_ids: Vec<i64> = {
        let mut conn = db.acquire().await?;
        dispatch!(&mut conn, |c| {
            sqlx::query_scalar("SELECT id FROM companies ORDER BY id")
                .fetch_all(&mut *c)
                .await?
        })
    };
    recompute_companies(db, &company_ids, policy).await
}
