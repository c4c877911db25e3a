//! Workout data model and the flattening rule.
//!
//! The model's reply is untrusted: any key may be missing and any value may
//! have the wrong JSON type. [`WorkoutRecord::from_json`] reads every field
//! with a fallback instead of deserialising into a strict schema, so a
//! half-right reply still yields whatever rows it does contain.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Fallback for a missing muscle group or exercise name.
pub const UNKNOWN: &str = "Unknown";

/// Date format used when the page carries no date.
pub const DATE_FORMAT: &str = "%m/%d/%Y";

/// Column headers, in output order.
pub const HEADER: [&str; 6] = ["Date", "Muscle Group", "Exercise", "Set", "Weight", "Reps"];

/// One page of a workout log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    /// Free-form date as written on the page.
    pub date: Option<String>,
    pub muscle_group: Option<String>,
    pub workouts: Vec<Exercise>,
}

/// One exercise and its sets, in page order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub exercise_name: Option<String>,
    pub sets: Vec<SetEntry>,
}

/// One set: weight lifted and repetitions performed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    pub set_number: Cell,
    /// Unit-suffixed, e.g. "50kg".
    pub weight: Cell,
    pub reps: Cell,
}

/// A scalar table cell as the model produced it.
///
/// Integers stay numeric so spreadsheets store them as numbers; anything else
/// the model wrote is kept verbatim as text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Empty,
    Int(i64),
    Text(String),
}

impl Cell {
    fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Cell::Empty,
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => Cell::Int(i),
                None => Cell::Text(n.to_string()),
            },
            Some(Value::String(s)) => Cell::Text(s.clone()),
            Some(Value::Bool(b)) => Cell::Text(b.to_string()),
            Some(other) => Cell::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

/// Read a text field. Only an absent key is `None` (and gets the default);
/// a present key is kept as written: `null` becomes an empty string, numbers
/// and booleans their literal, lists and objects their JSON text.
fn text_field(obj: &Value, key: &str) -> Option<String> {
    let value = obj.get(key)?;
    Some(match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => {
            warn!("Field '{}' is a {}; writing it as JSON text", key, kind(other));
            other.to_string()
        }
    })
}

/// Read an array field; anything that is not an array reads as empty.
fn array_field<'a>(obj: &'a Value, key: &str) -> &'a [Value] {
    match obj.get(key) {
        Some(Value::Array(items)) => items.as_slice(),
        Some(Value::Null) | None => &[],
        Some(other) => {
            warn!("Field '{}' is not a list ({}); treating as empty", key, kind(other));
            &[]
        }
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl WorkoutRecord {
    /// The empty result used when extraction fails: `{"workouts": []}`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a record from a parsed reply, tolerating missing keys and
    /// wrongly typed values.
    pub fn from_json(value: &Value) -> Self {
        let workouts = array_field(value, "workouts")
            .iter()
            .filter(|w| w.is_object())
            .map(|w| Exercise {
                exercise_name: text_field(w, "exercise_name"),
                sets: array_field(w, "sets")
                    .iter()
                    .filter(|s| s.is_object())
                    .map(|s| SetEntry {
                        set_number: Cell::from_json(s.get("set_number")),
                        weight: Cell::from_json(s.get("weight")),
                        reps: Cell::from_json(s.get("reps")),
                    })
                    .collect(),
            })
            .collect();

        Self {
            date: text_field(value, "date"),
            muscle_group: text_field(value, "muscle_group"),
            workouts,
        }
    }

    /// Number of sets across all exercises (= number of output rows).
    pub fn set_count(&self) -> usize {
        self.workouts.iter().map(|w| w.sets.len()).sum()
    }

    /// Flatten into one row per set, in document order.
    ///
    /// `today` fills in a missing date; callers pass the date at write time.
    pub fn flatten(&self, today: &str) -> Vec<OutputRow> {
        let date = self.date.as_deref().unwrap_or(today);
        let muscle_group = self.muscle_group.as_deref().unwrap_or(UNKNOWN);

        self.workouts
            .iter()
            .flat_map(|exercise| {
                let name = exercise.exercise_name.as_deref().unwrap_or(UNKNOWN);
                exercise.sets.iter().map(move |set| OutputRow {
                    date: date.to_string(),
                    muscle_group: muscle_group.to_string(),
                    exercise_name: name.to_string(),
                    set_number: set.set_number.clone(),
                    weight: set.weight.clone(),
                    reps: set.reps.clone(),
                })
            })
            .collect()
    }
}

/// Today's date in [`DATE_FORMAT`], local time.
pub fn today() -> String {
    chrono::Local::now().format(DATE_FORMAT).to_string()
}

/// One table row: a single set with its exercise and page context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub date: String,
    pub muscle_group: String,
    pub exercise_name: String,
    pub set_number: Cell,
    pub weight: Cell,
    pub reps: Cell,
}

impl OutputRow {
    /// The six cells in [`HEADER`] order.
    pub fn cells(&self) -> [Cell; 6] {
        [
            Cell::Text(self.date.clone()),
            Cell::Text(self.muscle_group.clone()),
            Cell::Text(self.exercise_name.clone()),
            self.set_number.clone(),
            self.weight.clone(),
            self.reps.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn one_row_per_set_in_document_order() {
        let v = json!({
            "date": "03/04/2024",
            "muscle_group": "Chest",
            "workouts": [
                {"exercise_name": "Bench", "sets": [
                    {"set_number": 1, "weight": "60kg", "reps": 10},
                    {"set_number": 2, "weight": "65kg", "reps": 8}
                ]},
                {"exercise_name": "Fly", "sets": [
                    {"set_number": 1, "weight": "12kg", "reps": 12}
                ]}
            ]
        });
        let record = WorkoutRecord::from_json(&v);
        let rows = record.flatten("01/01/2000");

        assert_eq!(rows.len(), record.set_count());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].exercise_name, "Bench");
        assert_eq!(rows[1].weight, Cell::Text("65kg".into()));
        assert_eq!(rows[2].exercise_name, "Fly");
        assert_eq!(rows[2].reps, Cell::Int(12));
        assert!(rows.iter().all(|r| r.date == "03/04/2024"));
    }

    #[test]
    fn empty_workouts_flatten_to_nothing() {
        let record = WorkoutRecord::from_json(&json!({"workouts": []}));
        assert!(record.flatten("01/01/2000").is_empty());
        assert_eq!(record, WorkoutRecord::empty());
    }

    #[test]
    fn missing_date_and_group_use_defaults() {
        let v = json!({"workouts": [{"sets": [{"set_number": 1}]}]});
        let rows = WorkoutRecord::from_json(&v).flatten("10/19/2026");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, "10/19/2026");
        assert_eq!(rows[0].muscle_group, UNKNOWN);
        assert_eq!(rows[0].exercise_name, UNKNOWN);
        assert_eq!(rows[0].weight, Cell::Empty);
        assert_eq!(rows[0].reps, Cell::Empty);
    }

    #[test]
    fn present_fields_are_written_as_given() {
        let v = json!({
            "date": "",
            "muscle_group": null,
            "workouts": [{"exercise_name": "  ", "sets": [{"set_number": 1}]}]
        });
        let rows = WorkoutRecord::from_json(&v).flatten("10/19/2026");
        assert_eq!(rows[0].date, "");
        assert_eq!(rows[0].muscle_group, "");
        assert_eq!(rows[0].exercise_name, "  ");
    }

    #[test]
    fn list_valued_group_is_kept_as_text() {
        let v = json!({"muscle_group": ["Arms", "Legs"], "workouts": [
            {"exercise_name": "Curl", "sets": [{"set_number": 1}]}
        ]});
        let rows = WorkoutRecord::from_json(&v).flatten("10/19/2026");
        assert_eq!(rows[0].muscle_group, r#"["Arms","Legs"]"#);
        assert_eq!(rows[0].date, "10/19/2026");
    }

    #[test]
    fn wrong_types_degrade_instead_of_failing() {
        let v = json!({
            "date": 20240102,
            "workouts": [
                "not an object",
                {"exercise_name": "Row", "sets": "five sets"},
                {"exercise_name": "Curl", "sets": [
                    {"set_number": "1", "weight": 20, "reps": 10.5},
                    42
                ]}
            ]
        });
        let record = WorkoutRecord::from_json(&v);
        assert_eq!(record.date.as_deref(), Some("20240102"));
        assert_eq!(record.workouts.len(), 2);
        assert!(record.workouts[0].sets.is_empty());

        let rows = record.flatten("x");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].set_number, Cell::Text("1".into()));
        assert_eq!(rows[0].weight, Cell::Int(20));
        assert_eq!(rows[0].reps, Cell::Text("10.5".into()));
    }

    #[test]
    fn non_object_reply_is_empty() {
        assert_eq!(WorkoutRecord::from_json(&json!([1, 2])), WorkoutRecord::empty());
    }

    #[test]
    fn cell_display() {
        assert_eq!(Cell::Empty.to_string(), "");
        assert_eq!(Cell::Int(8).to_string(), "8");
        assert_eq!(Cell::Text("100kg".into()).to_string(), "100kg");
    }

    #[test]
    fn today_uses_month_day_year() {
        let t = today();
        assert_eq!(t.len(), 10);
        assert_eq!(&t[2..3], "/");
        assert_eq!(&t[5..6], "/");
    }
}
