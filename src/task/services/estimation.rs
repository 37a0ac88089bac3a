//! Service layer for estimates and the completion feedback loop.

use super::{
    context::EngineContext,
    error::{WorkflowError, WorkflowResult},
    planning::completion_record,
};
use crate::task::{
    domain::{
        CompletionRecord, ComplexityFactors, Effort, Estimate, EstimateId, EstimateSuggestion,
        EstimationModel, ExtensionKey, ExtensionValue, Extensions, LearningInsights, ProjectId,
        Tags, TaskDomainError, TaskId, TaskType, select_similar,
    },
    ports::{ChangeSet, TaskRepository, TaskRepositoryError, WorkflowEvent},
};
use mockable::Clock;
use tracing::{debug, info};

/// Identifier stored with every estimate so later model changes can be told
/// apart in the history.
const MODEL_VERSION: &str = "history-blend.v1";

/// Estimation and learning orchestration service.
pub struct EstimationService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    context: EngineContext<R, C>,
}

impl<R, C> Clone for EstimationService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
        }
    }
}

impl<R, C> EstimationService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new estimation service.
    #[must_use]
    pub const fn new(context: EngineContext<R, C>) -> Self {
        Self { context }
    }

    /// Stores a new estimate version for a task and makes it current.
    ///
    /// Never fails for lack of history; without similar completed tasks the
    /// estimate has confidence 0 and an insufficient-history note.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown tasks,
    /// [`TaskDomainError::TaskTerminal`] for terminal tasks, and
    /// [`TaskRepositoryError::Conflict`] when the task changed concurrently.
    pub async fn estimate(
        &self,
        task_id: TaskId,
        factors: ComplexityFactors,
    ) -> WorkflowResult<Estimate> {
        let mut task = self.context.require_task(task_id).await?;
        if task.is_terminal() {
            return Err(TaskDomainError::TaskTerminal(task_id).into());
        }
        let records = self
            .context
            .repository
            .completions_for_project(task.project_id())
            .await?;
        let samples: Vec<&CompletionRecord> =
            select_similar(&records, task.task_type(), task.tags())
                .into_iter()
                .filter(|record| record.task_id != task_id)
                .collect();
        let suggestion = EstimationModel::new(&self.context.config.estimation)
            .suggest(&factors, &samples);

        let prior = self.context.repository.estimates_for(task_id).await?;
        let version = u32::try_from(prior.len())
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        let estimate = Estimate {
            id: EstimateId::new(),
            task_id,
            version,
            factors,
            suggestion,
            extensions: Extensions::new().with(
                ExtensionKey::EstimationModelV1,
                ExtensionValue::Text(MODEL_VERSION.to_owned()),
            )?,
            created_at: self.context.clock.utc(),
        };
        task.record_estimate(&estimate, &*self.context.clock)?;

        let mut changes = ChangeSet::new();
        changes.update_task(task);
        changes.append_estimate(estimate.clone());
        let events = [WorkflowEvent::EstimateRecorded {
            task_id,
            estimate_id: estimate.id,
            version,
            story_points: estimate.suggestion.story_points,
        }];
        self.context.commit(changes, &events).await?;
        info!(
            %task_id,
            version,
            story_points = %estimate.suggestion.story_points,
            confidence = estimate.suggestion.confidence,
            samples = estimate.suggestion.sample_count,
            "estimate recorded"
        );
        Ok(estimate)
    }

    /// Returns every estimate version of a task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns not-found for unknown tasks.
    pub async fn estimate_history(&self, task_id: TaskId) -> WorkflowResult<Vec<Estimate>> {
        self.context.require_task(task_id).await?;
        Ok(self.context.repository.estimates_for(task_id).await?)
    }

    /// Records corrected actuals for a terminated task.
    ///
    /// The new record supersedes earlier ones for the same task in the
    /// learning pool. Variance is measured against the estimate in force
    /// when the task terminated.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotTerminal`] for tasks still in progress and
    /// not-found for unknown tasks.
    pub async fn record_completion(
        &self,
        task_id: TaskId,
        actuals: Effort,
    ) -> WorkflowResult<CompletionRecord> {
        let task = self.context.require_task(task_id).await?;
        if !task.is_terminal() {
            return Err(WorkflowError::NotTerminal(task_id));
        }
        let record = completion_record(&task, actuals, self.context.clock.utc());
        let mut changes = ChangeSet::new();
        changes.append_completion(record.clone());
        let events = [WorkflowEvent::CompletionRecorded {
            task_id,
            completion_id: record.id,
            variance: record.variance,
        }];
        self.context.commit(changes, &events).await?;
        info!(
            %task_id,
            hours = record.actuals.hours,
            variance = ?record.variance,
            "completion recorded"
        );
        Ok(record)
    }

    /// Sizes work that does not exist yet without persisting anything.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::UnknownProject`] for unknown projects.
    pub async fn improved_estimate(
        &self,
        project_id: ProjectId,
        task_type: TaskType,
        tags: &Tags,
        factors: ComplexityFactors,
    ) -> WorkflowResult<EstimateSuggestion> {
        self.require_project(project_id).await?;
        let records = self
            .context
            .repository
            .completions_for_project(project_id)
            .await?;
        let samples = select_similar(&records, task_type, tags);
        debug!(%project_id, task_type = task_type.as_str(), samples = samples.len(), "sizing draft");
        Ok(EstimationModel::new(&self.context.config.estimation).suggest(&factors, &samples))
    }

    /// Aggregates how estimation accuracy evolves for a project.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::UnknownProject`] for unknown projects.
    pub async fn learning_insights(&self, project_id: ProjectId) -> WorkflowResult<LearningInsights> {
        self.require_project(project_id).await?;
        let records = self
            .context
            .repository
            .completions_for_project(project_id)
            .await?;
        Ok(EstimationModel::new(&self.context.config.estimation).insights(
            project_id,
            &records,
            self.context.clock.utc(),
        ))
    }

    async fn require_project(&self, project_id: ProjectId) -> WorkflowResult<()> {
        match self.context.repository.find_project(project_id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) | Err(TaskRepositoryError::ProjectNotFound(_)) => {
                Err(WorkflowError::UnknownProject(project_id))
            }
            Err(err) => Err(err.into()),
        }
    }
}
