use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    context::Context,
    error::{GraphError, Result},
    task::{NextAction, Task, TaskResult},
};

/// Edge between tasks in the graph
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// A graph of tasks that can be executed.
///
/// Graphs are immutable once built and can be shared between concurrent executions;
/// all per-execution state lives in the [`Context`] passed to [`Graph::execute`].
pub struct Graph {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: Vec<Edge>,
    start_task_id: Option<String>,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: HashMap::new(),
            edges: Vec::new(),
            start_task_id: None,
        }
    }

    /// Execute the graph from its start task.
    ///
    /// Tasks returning [`NextAction::ContinueAndExecute`] hand over to the task on their
    /// outgoing edge; the run stops at [`NextAction::End`], at a task without an outgoing
    /// edge, or at the first error, in which case no further task is run.
    pub async fn execute(&self, context: Context) -> Result<ExecutionResult> {
        let mut current = self
            .start_task_id
            .clone()
            .ok_or_else(|| GraphError::TaskNotFound(format!("no start task in graph {}", self.id)))?;
        let mut executed_tasks = Vec::new();

        loop {
            let result = self.execute_single_task(&current, context.clone()).await?;
            executed_tasks.push(result.task_id.clone());

            debug!(
                graph_id = %self.id,
                task_id = %result.task_id,
                next_action = ?result.next_action,
                status = ?result.status_message,
                "Task finished"
            );

            let next = match result.next_action {
                NextAction::ContinueAndExecute => self.find_next_task(&result.task_id),
                NextAction::End => None,
            };

            match next {
                Some(next_task_id) => current = next_task_id,
                None => {
                    info!(
                        graph_id = %self.id,
                        tasks = executed_tasks.len(),
                        "Graph execution completed"
                    );
                    return Ok(ExecutionResult {
                        response: result.response,
                        status_message: result.status_message,
                        executed_tasks,
                    });
                }
            }
        }
    }

    async fn execute_single_task(&self, task_id: &str, context: Context) -> Result<TaskResult> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| GraphError::TaskNotFound(task_id.to_string()))?;

        let mut result = task.run(context).await?;

        // Set the task_id in the result to track which task generated it
        result.task_id = task_id.to_string();

        Ok(result)
    }

    /// Find the task on the outgoing edge of `current_task_id`
    pub fn find_next_task(&self, current_task_id: &str) -> Option<String> {
        self.edges
            .iter()
            .find(|edge| edge.from == current_task_id)
            .map(|edge| edge.to.clone())
    }

    pub fn start_task_id(&self) -> Option<&str> {
        self.start_task_id.as_deref()
    }
}

/// Builder for creating graphs
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(id),
        }
    }

    /// Add a task; the first task added becomes the start task
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        if self.graph.tasks.is_empty() {
            self.graph.start_task_id = Some(task_id.clone());
        }
        self.graph.tasks.insert(task_id, task);
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.edges.push(Edge {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Override the start task. Ignored if no task with that id is registered.
    pub fn set_start_task(mut self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        if self.graph.tasks.contains_key(&task_id) {
            self.graph.start_task_id = Some(task_id);
        }
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// Outcome of a completed graph execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Response of the last task that ran
    pub response: Option<String>,
    pub status_message: Option<String>,
    /// Ids of the tasks that ran, in order
    pub executed_tasks: Vec<String>,
}
