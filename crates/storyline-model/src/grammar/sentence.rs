//! Sentence grammars: natural-language templates with `{cell}` placeholders.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellHandling, CellValues};
use crate::context::ExecutionContext;
use crate::error::{ModelError, Result};
use crate::plan::{ExecutablePlan, Expectation, InvalidGrammarStep, Plan};
use crate::step::Step;
use crate::template;

use super::{Grammar, GrammarModel};

/// Sentence metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub key: String,
    pub format: String,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

impl Sentence {
    /// Build a sentence from its format, creating one `String` cell per
    /// distinct placeholder in order of first appearance.
    pub fn new(key: impl Into<String>, format: impl Into<String>) -> Self {
        let format = format.into();
        let cells = template::substitutions(&format)
            .into_iter()
            .map(Cell::string)
            .collect();
        Self {
            key: key.into(),
            format,
            cells,
        }
    }

    /// Build a sentence with explicitly declared cells. No scanning happens;
    /// see [`Sentence::validate`].
    pub fn with_cells(key: impl Into<String>, format: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            key: key.into(),
            format: format.into(),
            cells,
        }
    }

    pub fn find_cell(&self, key: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.key == key)
    }

    pub fn add_cell(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    /// Check that every placeholder has a cell and that cell keys are unique.
    pub fn validate(&self) -> Result<()> {
        for (i, cell) in self.cells.iter().enumerate() {
            if self.cells[..i].iter().any(|c| c.key == cell.key) {
                return Err(ModelError::DuplicateCell {
                    key: self.key.clone(),
                    cell: cell.key.clone(),
                });
            }
        }

        for placeholder in template::substitutions(&self.format) {
            if self.find_cell(&placeholder).is_none() {
                return Err(ModelError::UnboundPlaceholder {
                    key: self.key.clone(),
                    placeholder,
                });
            }
        }

        Ok(())
    }

    /// Merge an authored override into this sentence.
    ///
    /// - no override, or a non-sentence override: keep this format, copy each
    ///   cell through a `None` merge
    /// - sentence override: a non-empty override format wins; each existing
    ///   cell merges with the override's cell of the same key; cells only the
    ///   override declares are appended
    pub fn apply_overrides(&self, over: Option<&GrammarModel>) -> Sentence {
        let over = match over {
            Some(GrammarModel::Sentence(over)) => over,
            _ => {
                return Sentence {
                    key: self.key.clone(),
                    format: self.format.clone(),
                    cells: self.cells.iter().map(|c| c.apply_overrides(None)).collect(),
                }
            }
        };

        let format = if over.format.is_empty() {
            self.format.clone()
        } else {
            over.format.clone()
        };

        let mut cells: Vec<Cell> = self
            .cells
            .iter()
            .map(|c| c.apply_overrides(over.find_cell(&c.key)))
            .collect();

        for extra in &over.cells {
            if !cells.iter().any(|c| c.key == extra.key) {
                cells.push(extra.apply_overrides(None));
            }
        }

        Sentence {
            key: self.key.clone(),
            format,
            cells,
        }
    }

    pub fn result_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| c.result)
    }

    /// Stub method for an unimplemented sentence.
    ///
    /// Parameters list non-result cells first. With exactly one result cell
    /// that cell becomes the `String` return value; otherwise the stub returns
    /// nothing and result cells are `&mut` out parameters.
    pub fn to_missing_code(&self) -> String {
        let results: Vec<&Cell> = self.result_cells().collect();

        if let [single] = results.as_slice() {
            let args = self
                .cells
                .iter()
                .filter(|c| !c.result)
                .map(Cell::to_declaration)
                .collect::<Vec<_>>();
            return format!(
                "\n    #[result(\"{}\")]\n    pub fn {}({}) -> String {{\n        todo!()\n    }}\n",
                single.key,
                self.key,
                receiver_and(&args)
            );
        }

        let mut ordered: Vec<&Cell> = self.cells.iter().collect();
        ordered.sort_by_key(|c| c.result);
        let args = ordered
            .into_iter()
            .map(|c| {
                if c.result {
                    c.to_out_declaration()
                } else {
                    c.to_declaration()
                }
            })
            .collect::<Vec<_>>();

        format!(
            "\n    pub fn {}({}) {{\n        todo!()\n    }}\n",
            self.key,
            receiver_and(&args)
        )
    }

    pub fn title_or_format(&self) -> &str {
        &self.format
    }
}

fn receiver_and(args: &[String]) -> String {
    if args.is_empty() {
        "&self".to_string()
    } else {
        format!("&self, {}", args.join(", "))
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sentence: {} ({})", self.format, self.key)
    }
}

/// Action behind a sentence. Returns the actual value of the result cell,
/// if the sentence has one.
pub type SentenceAction =
    Arc<dyn Fn(&CellValues, &mut ExecutionContext) -> anyhow::Result<Option<String>> + Send + Sync>;

/// Runtime sentence grammar.
#[derive(Clone)]
pub struct SentenceGrammar {
    model: Sentence,
    action: SentenceAction,
}

impl SentenceGrammar {
    /// Sentence whose cells are discovered from `format`.
    pub fn new<F>(key: &str, format: &str, action: F) -> Self
    where
        F: Fn(&CellValues, &mut ExecutionContext) -> anyhow::Result<Option<String>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            model: Sentence::new(key, format),
            action: Arc::new(action),
        }
    }

    /// Sentence with explicitly typed cells; fails when a placeholder has no
    /// cell or a cell key repeats.
    pub fn with_cells<F>(key: &str, format: &str, cells: Vec<Cell>, action: F) -> Result<Self>
    where
        F: Fn(&CellValues, &mut ExecutionContext) -> anyhow::Result<Option<String>>
            + Send
            + Sync
            + 'static,
    {
        let model = Sentence::with_cells(key, format, cells);
        model.validate()?;
        Ok(Self {
            model,
            action: Arc::new(action),
        })
    }

    /// Add an out-of-line result cell.
    pub fn returning(mut self, cell: Cell) -> Self {
        self.model.cells.retain(|c| c.key != cell.key);
        self.model.add_cell(cell.as_result());
        self
    }

    pub fn model(&self) -> &Sentence {
        &self.model
    }
}

impl fmt::Debug for SentenceGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentenceGrammar")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Grammar for SentenceGrammar {
    fn key(&self) -> &str {
        &self.model.key
    }

    fn compile(&self, cells: &CellHandling) -> Arc<GrammarModel> {
        let mut sentence = self.model.clone();
        sentence.cells = sentence.cells.iter().map(|c| cells.normalize(c)).collect();
        Arc::new(GrammarModel::Sentence(sentence))
    }

    fn create_plan(&self, step: &Step, cells: &CellHandling) -> Plan {
        let mut values = CellValues::default();
        let mut expectation = None;
        // Raw text per cell, defaults included, for the description.
        let mut shown = step.values.clone();

        for cell in &self.model.cells {
            let raw = step.values.get(&cell.key).or(cell.default_value.as_ref());
            if let Some(raw) = raw {
                shown
                    .entry(cell.key.clone())
                    .or_insert_with(|| raw.clone());
            }

            if cell.result {
                expectation = Some(Expectation {
                    cell: cell.key.clone(),
                    expected: raw.cloned(),
                });
                continue;
            }

            let converted = match raw {
                Some(raw) => cells.convert(cell, raw),
                None => Err(ModelError::MissingValue(cell.key.clone())),
            };

            match converted {
                Ok(value) => values.insert(cell.key.clone(), value),
                Err(e) => {
                    return Plan::Invalid(InvalidGrammarStep::new(&step.id, e.to_string()));
                }
            }
        }

        Plan::Executable(ExecutablePlan::new(
            &step.id,
            &self.model.key,
            template::substitute(&self.model.format, &shown),
            values,
            expectation,
            Arc::clone(&self.action),
        ))
    }
}
