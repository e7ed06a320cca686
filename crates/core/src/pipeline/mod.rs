//! Production pipelines: catalog, backward scheduling and dependency gating.

mod catalog;
mod dependency;
mod scheduler;

pub use catalog::{
    steps, CatalogError, PipelineCatalog, PipelineDefinition, ProductionMethod, StepTemplate,
};
pub use dependency::DependencyResolver;
pub use scheduler::{
    compute_priority, hours, plan_pipeline, plan_trigger, schedule_backward, SchedulerError,
    StepWindow, TaskScheduler, DEFAULT_BUFFER_HOURS,
};
