//! Report registry: one singleton renderer per report kind.
//!
//! Fixtures push structured data into a report through
//! [`ReportRegistry::reporter_for`]; rendering happens once, when the engine
//! collects [`RenderedReport`]s for a specification's results.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A report kind. Instances are created on first use and live until the
/// registry is drained.
pub trait Report: Send + 'static {
    fn title(&self) -> String;

    fn render(&self) -> String;
}

/// Rendered output of one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedReport {
    pub title: String,
    pub rendered: String,
}

trait ErasedReport: Send {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn rendered(&self) -> RenderedReport;
}

impl<T: Report> ErasedReport for T {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn rendered(&self) -> RenderedReport {
        RenderedReport {
            title: self.title(),
            rendered: self.render(),
        }
    }
}

#[derive(Default)]
pub struct ReportRegistry {
    reports: HashMap<TypeId, Box<dyn ErasedReport>>,
    order: Vec<TypeId>,
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The singleton report of kind `T`, created on first request.
    pub fn reporter_for<T: Report + Default>(&mut self) -> &mut T {
        let id = TypeId::of::<T>();
        let order = &mut self.order;
        let report = self.reports.entry(id).or_insert_with(|| {
            order.push(id);
            Box::new(T::default())
        });

        match report.as_any_mut().downcast_mut::<T>() {
            Some(report) => report,
            None => unreachable!("report registered under a foreign TypeId"),
        }
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Render every report in creation order.
    pub fn generate_reports(&self) -> Vec<RenderedReport> {
        self.order
            .iter()
            .filter_map(|id| self.reports.get(id))
            .map(|report| report.rendered())
            .collect()
    }

    /// Render every report and clear the registry.
    pub fn drain(&mut self) -> Vec<RenderedReport> {
        let rendered = self.generate_reports();
        self.reports.clear();
        self.order.clear();
        rendered
    }
}

impl fmt::Debug for ReportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportRegistry")
            .field("reports", &self.reports.len())
            .finish()
    }
}
