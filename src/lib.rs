//! Mentorship engine - reviewer capacity, reassignment workflow and weekly
//! review compliance over a local SQLite record store.
//!
//! [`MentorshipEngine`] wires every service over one connection pool and one
//! directory cache. The library installs no logger; hosts pick their own
//! `log` backend.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use config::EngineConfig;
use db::pool::DbPool;
use db::{persons, with_timeout};
use error::AppError;
use models::{NewPerson, Person, ProfileUpdate};
use services::compliance::ComplianceAggregator;
use services::overdue_signals::{self, ReviewOverduePayload};
use services::{
    AssignmentWorkflow, AuthorizationPolicy, CapacityCache, CapacityDirectory, ReviewCycleWindow,
    ReviewLedger,
};

/// All services over one store.
pub struct MentorshipEngine {
    pool: DbPool,
    config: EngineConfig,
    directory: Arc<CapacityDirectory>,
    policy: Arc<AuthorizationPolicy>,
    workflow: AssignmentWorkflow,
    ledger: ReviewLedger,
    compliance: ComplianceAggregator,
}

impl MentorshipEngine {
    /// Open (creating and migrating if needed) the database at `db_path`.
    pub async fn open(db_path: &Path, config: EngineConfig) -> Result<Self, AppError> {
        config.validate()?;
        let pool = db::initialize(db_path).await?;
        log::info!("[engine] Opened record store at {:?}", db_path);
        Ok(Self::from_pool(pool, config))
    }

    /// Wire the services over an already migrated pool.
    pub fn from_pool(pool: DbPool, config: EngineConfig) -> Self {
        let cache = Arc::new(CapacityCache::new(config.directory_cache_ttl()));
        let directory = Arc::new(CapacityDirectory::new(pool.clone(), cache, config.clone()));
        let policy = Arc::new(AuthorizationPolicy::new(
            pool.clone(),
            directory.clone(),
            config.store_timeout(),
        ));

        Self {
            workflow: AssignmentWorkflow::new(pool.clone(), directory.clone(), config.clone()),
            ledger: ReviewLedger::new(pool.clone(), policy.clone(), config.clone()),
            compliance: ComplianceAggregator::new(pool.clone(), config.clone()),
            pool,
            config,
            directory,
            policy,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn directory(&self) -> &CapacityDirectory {
        &self.directory
    }

    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }

    pub fn workflow(&self) -> &AssignmentWorkflow {
        &self.workflow
    }

    pub fn ledger(&self) -> &ReviewLedger {
        &self.ledger
    }

    pub fn compliance(&self) -> &ComplianceAggregator {
        &self.compliance
    }

    /// Add a person to the record store.
    pub async fn register_person(&self, person: NewPerson) -> Result<Person, AppError> {
        let created = with_timeout(
            self.config.store_timeout(),
            "register_person",
            persons::insert_person(&self.pool, &person, self.config.default_capacity),
        )
        .await?;

        let mut touched = vec![created.campus.clone()];
        if let Some(mentor_id) = created.mentor_link {
            touched.push(self.campus_of(mentor_id).await?);
        }
        self.directory.invalidate_campuses(touched).await;
        Ok(created)
    }

    /// Edit a person's name, roles, campus or capacity override.
    ///
    /// Refused with `CapacityExceeded` when the new limit is below the
    /// person's current reviewee count.
    pub async fn update_profile(
        &self,
        person_id: i64,
        update: ProfileUpdate,
    ) -> Result<Person, AppError> {
        let updated = with_timeout(
            self.config.store_timeout(),
            "update_profile",
            persons::update_profile(
                &self.pool,
                person_id,
                &update,
                self.config.default_capacity,
            ),
        )
        .await?;

        // A campus move can affect two scoped listings; drop them all.
        self.directory.cache().invalidate_all().await;
        Ok(updated)
    }

    /// Detach a learner from their reviewer outside the request workflow.
    ///
    /// Returns whether a link was cleared.
    pub async fn release_reviewee(&self, learner_id: i64) -> Result<bool, AppError> {
        let learner = with_timeout(
            self.config.store_timeout(),
            "release_reviewee",
            persons::require_person(&self.pool, learner_id),
        )
        .await?;
        let Some(mentor_id) = learner.mentor_link else {
            return Ok(false);
        };

        let cleared = with_timeout(
            self.config.store_timeout(),
            "release_reviewee",
            persons::clear_mentor_link(&self.pool, learner_id),
        )
        .await?;
        if cleared {
            log::info!(
                "[engine] Person {} released from reviewer {}",
                learner_id,
                mentor_id
            );
            let campus = self.campus_of(mentor_id).await?;
            self.directory.invalidate_campuses([campus]).await;
        }
        Ok(cleared)
    }

    /// Overdue payloads for the cycle in `window`.
    pub async fn overdue_signals(
        &self,
        window: ReviewCycleWindow,
    ) -> Result<Vec<ReviewOverduePayload>, AppError> {
        overdue_signals::collect(&self.compliance, window).await
    }

    async fn campus_of(&self, person_id: i64) -> Result<Option<String>, AppError> {
        let person = with_timeout(
            self.config.store_timeout(),
            "campus_of",
            persons::get_person(&self.pool, person_id),
        )
        .await?;
        Ok(person.and_then(|p| p.campus))
    }
}
