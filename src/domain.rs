//! Domain records stored by the authoring tool: modules, problems (three kinds),
//! concepts and misconceptions, plus the composed `StateModule` the UI reads.
//!
//! Field names follow the remote JSON schema (camelCase), so records round-trip
//! through the remote state source unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which exercise shape a problem carries.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemKind {
  MultipleChoice,
  WordProblem,
  NDigitOperation,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemDifficulty {
  #[default]
  Easy,
  Medium,
  Hard,
}

/// Arithmetic operator of an n-digit operation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
  #[default]
  Plus,
  Minus,
  Multiply,
  Divide,
}

/// One selectable answer of a multiple-choice problem.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MultipleChoiceOption {
  pub id: String,
  #[serde(default)] pub text: String,
  #[serde(default)] pub is_correct: bool,
  #[serde(default)] pub feedback: String,
  /// Fields written by other clients that this crate does not model.
  #[serde(flatten)] pub extra: Map<String, Value>,
}

/// One fill-in slot of a word problem (`prefix [answer] suffix`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnswerBlock {
  pub id: String,
  #[serde(default)] pub prefix: String,
  #[serde(default)] pub answer: String,
  #[serde(default)] pub suffix: String,
  #[serde(flatten)] pub extra: Map<String, Value>,
}

/// Kind-specific payload. Serialized inline with the `kind` tag.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemBody {
  MultipleChoice {
    #[serde(default)]
    options: Vec<MultipleChoiceOption>,
  },
  WordProblem {
    #[serde(default, rename = "answerBlocks")]
    answer_blocks: Vec<AnswerBlock>,
  },
  #[serde(rename = "N_DIGIT_OPERATION")]
  NDigitOperation {
    #[serde(default = "default_operand1")]
    operand1: String,
    #[serde(default = "default_operand2")]
    operand2: String,
    #[serde(default)]
    operator: Operator,
    #[serde(default, rename = "includeCarryAndBorrow")]
    include_carry_and_borrow: bool,
  },
}

impl ProblemBody {
  /// Payload a freshly created problem of `kind` starts with.
  pub fn default_for(kind: ProblemKind) -> Self {
    match kind {
      ProblemKind::MultipleChoice => ProblemBody::MultipleChoice { options: Vec::new() },
      ProblemKind::WordProblem => ProblemBody::WordProblem { answer_blocks: Vec::new() },
      ProblemKind::NDigitOperation => ProblemBody::NDigitOperation {
        operand1: DEFAULT_OPERAND1.into(),
        operand2: DEFAULT_OPERAND2.into(),
        operator: Operator::Plus,
        include_carry_and_borrow: false,
      },
    }
  }

  pub fn kind(&self) -> ProblemKind {
    match self {
      ProblemBody::MultipleChoice { .. } => ProblemKind::MultipleChoice,
      ProblemBody::WordProblem { .. } => ProblemKind::WordProblem,
      ProblemBody::NDigitOperation { .. } => ProblemKind::NDigitOperation,
    }
  }
}

pub const DEFAULT_OPERAND1: &str = "200";
pub const DEFAULT_OPERAND2: &str = "100";

fn default_operand1() -> String { DEFAULT_OPERAND1.into() }
fn default_operand2() -> String { DEFAULT_OPERAND2.into() }

/// A single exercise. Shared fields plus a kind-tagged payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
  pub id: String,
  #[serde(default)] pub title: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub difficulty: ProblemDifficulty,
  #[serde(default)] pub concepts: Vec<String>,
  #[serde(default)] pub ai_prompt: String,
  /// Records written without timestamps read as the Unix epoch.
  #[serde(default)] pub created_at: DateTime<Utc>,
  #[serde(default)] pub updated_at: DateTime<Utc>,
  #[serde(default)] pub created_by: String,
  #[serde(flatten)]
  pub body: ProblemBody,
}

impl Problem {
  /// New problem with the creation defaults for its kind: empty text fields,
  /// `EASY`, no concepts, both timestamps set to `now`.
  pub fn with_defaults(id: impl Into<String>, kind: ProblemKind, created_by: impl Into<String>, now: DateTime<Utc>) -> Self {
    Self {
      id: id.into(),
      title: String::new(),
      description: String::new(),
      difficulty: ProblemDifficulty::Easy,
      concepts: Vec::new(),
      ai_prompt: String::new(),
      created_at: now,
      updated_at: now,
      created_by: created_by.into(),
      body: ProblemBody::default_for(kind),
    }
  }

  pub fn kind(&self) -> ProblemKind { self.body.kind() }
}

/// Normalized module: problems are referenced by id only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Module {
  pub id: String,
  #[serde(default)] pub name: String,
  #[serde(default)] pub description: String,
  /// Ordered problem ids. Every id must exist in the problems repository.
  #[serde(default)] pub problems: Vec<String>,
}

/// Composed module: the problem ids replaced by value copies of the problems.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct StateModule {
  pub id: String,
  #[serde(default)] pub name: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub problems: Vec<Problem>,
}

impl From<&StateModule> for Module {
  fn from(view: &StateModule) -> Self {
    Module {
      id: view.id.clone(),
      name: view.name.clone(),
      description: view.description.clone(),
      problems: view.problems.iter().map(|p| p.id.clone()).collect(),
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
  pub id: String,
  #[serde(default)] pub name: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub related_concepts: Vec<String>,
  #[serde(default)] pub ai_prompt: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Misconception {
  pub id: String,
  #[serde(default)] pub name: String,
  #[serde(default)] pub ai_definition: String,
  #[serde(default)] pub ai_feedback: String,
}
