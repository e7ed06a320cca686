//! Production methods and their step templates.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{OrderStatus, Role};

/// Well-known step names.
pub mod steps {
    pub const GRAPHIC_DESIGN: &str = "GRAPHIC_DESIGN";
    pub const SCREEN_MAKING: &str = "SCREEN_MAKING";
    pub const CUTTING: &str = "CUTTING";
    pub const PRINTING: &str = "PRINTING";
    pub const SUBLIMATION_PRINTING: &str = "SUBLIMATION_PRINTING";
    pub const HEAT_PRESS: &str = "HEAT_PRESS";
    pub const DTF_PRINTING: &str = "DTF_PRINTING";
    pub const SEWING: &str = "SEWING";
    pub const EMBROIDERY: &str = "EMBROIDERY";
    pub const QUALITY_CONTROL: &str = "QUALITY_CONTROL";
    pub const PACKING: &str = "PACKING";
    pub const DELIVERY: &str = "DELIVERY";

    pub const DESIGN_MOCKUP: &str = "DESIGN_MOCKUP";
    pub const CLIENT_APPROVAL_FOLLOWUP: &str = "CLIENT_APPROVAL_FOLLOWUP";
    pub const DELIVERY_CONFIRMATION: &str = "DELIVERY_CONFIRMATION";
}

/// How an order's goods are produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProductionMethod {
    Silkscreen,
    Sublimation,
    Dtf,
    Embroidery,
}

impl ProductionMethod {
    pub const ALL: [ProductionMethod; 4] = [
        ProductionMethod::Silkscreen,
        ProductionMethod::Sublimation,
        ProductionMethod::Dtf,
        ProductionMethod::Embroidery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionMethod::Silkscreen => "silkscreen",
            ProductionMethod::Sublimation => "sublimation",
            ProductionMethod::Dtf => "dtf",
            ProductionMethod::Embroidery => "embroidery",
        }
    }
}

impl fmt::Display for ProductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductionMethod::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown production method: {}", s))
    }
}

fn default_true() -> bool {
    true
}

/// A unit of work in a pipeline definition.
///
/// Position within a pipeline is the template's index in its step list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepTemplate {
    pub name: String,
    pub role: Role,
    pub estimated_hours: f64,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Names of steps that must be completed first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    /// Set for templates instantiated when an order enters this status
    /// instead of at pipeline generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_status: Option<OrderStatus>,
}

impl StepTemplate {
    pub fn new(name: &str, role: Role, estimated_hours: f64) -> Self {
        Self {
            name: name.to_string(),
            role,
            estimated_hours,
            required: true,
            dependencies: Vec::new(),
            required_skills: Vec::new(),
            trigger_status: None,
        }
    }

    pub fn depends_on(mut self, names: &[&str]) -> Self {
        self.dependencies = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_skills(mut self, skills: &[&str]) -> Self {
        self.required_skills = skills.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn triggered_by(mut self, status: OrderStatus) -> Self {
        self.trigger_status = Some(status);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Step list for one production method, as loaded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineDefinition {
    pub method: ProductionMethod,
    pub steps: Vec<StepTemplate>,
}

/// Errors from validating pipeline definitions.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("Pipeline for {0} has no steps")]
    EmptyPipeline(ProductionMethod),

    #[error("Duplicate step {step} in {method} pipeline")]
    DuplicateStep {
        method: ProductionMethod,
        step: String,
    },

    #[error("Step {step} in {method} pipeline depends on {dependency}, which is not an earlier step")]
    UnknownDependency {
        method: ProductionMethod,
        step: String,
        dependency: String,
    },

    #[error("Step {step} must have positive estimated hours (got {hours})")]
    NonPositiveHours { step: String, hours: f64 },

    #[error("Pipeline step {0} must not declare a trigger status")]
    UnexpectedTrigger(String),

    #[error("Trigger template {0} has no trigger status")]
    MissingTrigger(String),

    #[error("Trigger template {step} depends on {dependency}, which is missing from the {method} pipeline")]
    UnresolvableTriggerDependency {
        method: ProductionMethod,
        step: String,
        dependency: String,
    },
}

/// Maps production methods to their ordered step templates, plus the
/// trigger-status templates shared by every method.
#[derive(Debug, Clone)]
pub struct PipelineCatalog {
    pipelines: HashMap<ProductionMethod, Vec<StepTemplate>>,
    triggers: Vec<StepTemplate>,
}

impl PipelineCatalog {
    /// The built-in catalog.
    pub fn standard() -> Self {
        use steps::*;

        let mut pipelines = HashMap::new();

        pipelines.insert(
            ProductionMethod::Silkscreen,
            vec![
                StepTemplate::new(GRAPHIC_DESIGN, Role::GraphicArtist, 4.0),
                StepTemplate::new(SCREEN_MAKING, Role::ScreenMaker, 2.0)
                    .depends_on(&[GRAPHIC_DESIGN])
                    .with_skills(&["screen_exposure"]),
                StepTemplate::new(CUTTING, Role::Cutter, 6.0),
                StepTemplate::new(PRINTING, Role::Printer, 8.0)
                    .depends_on(&[SCREEN_MAKING, CUTTING])
                    .with_skills(&["silkscreen"]),
                StepTemplate::new(QUALITY_CONTROL, Role::QcInspector, 2.0).depends_on(&[PRINTING]),
                StepTemplate::new(PACKING, Role::WarehouseStaff, 3.0).depends_on(&[QUALITY_CONTROL]),
                StepTemplate::new(DELIVERY, Role::Driver, 4.0).depends_on(&[PACKING]),
            ],
        );

        pipelines.insert(
            ProductionMethod::Sublimation,
            vec![
                StepTemplate::new(GRAPHIC_DESIGN, Role::GraphicArtist, 4.0),
                StepTemplate::new(SUBLIMATION_PRINTING, Role::Printer, 6.0)
                    .depends_on(&[GRAPHIC_DESIGN])
                    .with_skills(&["sublimation"]),
                StepTemplate::new(HEAT_PRESS, Role::Printer, 3.0)
                    .depends_on(&[SUBLIMATION_PRINTING])
                    .with_skills(&["heat_press"]),
                StepTemplate::new(CUTTING, Role::Cutter, 4.0).depends_on(&[HEAT_PRESS]),
                StepTemplate::new(SEWING, Role::Sewer, 8.0).depends_on(&[CUTTING]),
                StepTemplate::new(QUALITY_CONTROL, Role::QcInspector, 2.0)
                    .depends_on(&[HEAT_PRESS, SEWING]),
                StepTemplate::new(PACKING, Role::WarehouseStaff, 3.0).depends_on(&[QUALITY_CONTROL]),
                StepTemplate::new(DELIVERY, Role::Driver, 4.0).depends_on(&[PACKING]),
            ],
        );

        pipelines.insert(
            ProductionMethod::Dtf,
            vec![
                StepTemplate::new(GRAPHIC_DESIGN, Role::GraphicArtist, 3.0),
                StepTemplate::new(CUTTING, Role::Cutter, 6.0),
                StepTemplate::new(SEWING, Role::Sewer, 8.0).depends_on(&[CUTTING]),
                StepTemplate::new(DTF_PRINTING, Role::Printer, 4.0)
                    .depends_on(&[GRAPHIC_DESIGN, SEWING])
                    .with_skills(&["dtf"]),
                StepTemplate::new(QUALITY_CONTROL, Role::QcInspector, 2.0)
                    .depends_on(&[DTF_PRINTING, SEWING]),
                StepTemplate::new(PACKING, Role::WarehouseStaff, 3.0).depends_on(&[QUALITY_CONTROL]),
                StepTemplate::new(DELIVERY, Role::Driver, 4.0).depends_on(&[PACKING]),
            ],
        );

        pipelines.insert(
            ProductionMethod::Embroidery,
            vec![
                StepTemplate::new(GRAPHIC_DESIGN, Role::GraphicArtist, 5.0)
                    .with_skills(&["digitizing"]),
                StepTemplate::new(CUTTING, Role::Cutter, 6.0),
                StepTemplate::new(SEWING, Role::Sewer, 8.0).depends_on(&[CUTTING]),
                StepTemplate::new(EMBROIDERY, Role::Embroiderer, 10.0)
                    .depends_on(&[GRAPHIC_DESIGN, SEWING])
                    .with_skills(&["embroidery"]),
                StepTemplate::new(QUALITY_CONTROL, Role::QcInspector, 2.0)
                    .depends_on(&[EMBROIDERY, SEWING]),
                StepTemplate::new(PACKING, Role::WarehouseStaff, 3.0).depends_on(&[QUALITY_CONTROL]),
                StepTemplate::new(DELIVERY, Role::Driver, 4.0).depends_on(&[PACKING]),
            ],
        );

        Self {
            pipelines,
            triggers: Self::standard_triggers(),
        }
    }

    fn standard_triggers() -> Vec<StepTemplate> {
        use steps::*;

        vec![
            StepTemplate::new(DESIGN_MOCKUP, Role::GraphicArtist, 2.0)
                .triggered_by(OrderStatus::DesignPending),
            StepTemplate::new(CLIENT_APPROVAL_FOLLOWUP, Role::CsrAgent, 1.0)
                .triggered_by(OrderStatus::DesignApproval)
                .optional(),
            StepTemplate::new(DELIVERY_CONFIRMATION, Role::CsrAgent, 1.0)
                .triggered_by(OrderStatus::Delivered)
                .depends_on(&[DELIVERY]),
        ]
    }

    /// Build a catalog from explicit definitions.
    ///
    /// Methods without a definition have no pipeline.
    pub fn from_definitions(
        definitions: Vec<PipelineDefinition>,
        triggers: Vec<StepTemplate>,
    ) -> Result<Self, CatalogError> {
        let catalog = Self {
            pipelines: definitions
                .into_iter()
                .map(|def| (def.method, def.steps))
                .collect(),
            triggers,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The built-in catalog with some methods replaced.
    pub fn with_overrides(definitions: Vec<PipelineDefinition>) -> Result<Self, CatalogError> {
        let mut catalog = Self::standard();
        for def in definitions {
            catalog.pipelines.insert(def.method, def.steps);
        }
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        for (method, steps) in &self.pipelines {
            if steps.is_empty() {
                return Err(CatalogError::EmptyPipeline(*method));
            }

            let mut seen: HashSet<&str> = HashSet::new();
            for step in steps {
                if step.trigger_status.is_some() {
                    return Err(CatalogError::UnexpectedTrigger(step.name.clone()));
                }
                check_hours(step)?;
                for dep in &step.dependencies {
                    if !seen.contains(dep.as_str()) {
                        return Err(CatalogError::UnknownDependency {
                            method: *method,
                            step: step.name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
                if !seen.insert(step.name.as_str()) {
                    return Err(CatalogError::DuplicateStep {
                        method: *method,
                        step: step.name.clone(),
                    });
                }
            }
        }

        for trigger in &self.triggers {
            if trigger.trigger_status.is_none() {
                return Err(CatalogError::MissingTrigger(trigger.name.clone()));
            }
            check_hours(trigger)?;
            for (method, steps) in &self.pipelines {
                if steps.iter().any(|s| s.name == trigger.name) {
                    return Err(CatalogError::DuplicateStep {
                        method: *method,
                        step: trigger.name.clone(),
                    });
                }
                for dep in &trigger.dependencies {
                    if !steps.iter().any(|s| &s.name == dep) {
                        return Err(CatalogError::UnresolvableTriggerDependency {
                            method: *method,
                            step: trigger.name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Ordered steps for a method.
    pub fn steps_for(&self, method: ProductionMethod) -> Option<&[StepTemplate]> {
        self.pipelines.get(&method).map(|s| s.as_slice())
    }

    /// Trigger templates activated by entering `status`.
    pub fn triggers_for(&self, status: OrderStatus) -> impl Iterator<Item = &StepTemplate> {
        self.triggers
            .iter()
            .filter(move |t| t.trigger_status == Some(status))
    }

    pub fn methods(&self) -> Vec<ProductionMethod> {
        let mut methods: Vec<_> = self.pipelines.keys().copied().collect();
        methods.sort();
        methods
    }
}

fn check_hours(step: &StepTemplate) -> Result<(), CatalogError> {
    if step.estimated_hours.is_finite() && step.estimated_hours > 0.0 {
        Ok(())
    } else {
        Err(CatalogError::NonPositiveHours {
            step: step.name.clone(),
            hours: step.estimated_hours,
        })
    }
}

impl Default for PipelineCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
