//! Prompts sent to the vision model.
//!
//! Callers can replace the extraction prompt via
//! [`crate::config::ExtractionConfig::prompt`]; the constants here are used
//! only when no override is provided.

/// Default instruction sent alongside each page image.
///
/// The JSON example doubles as the schema the reply is read against in
/// [`crate::record::WorkoutRecord::from_json`].
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"The task is to extract workout data from the provided image of a handwritten workout log. Detect and organize the following information:

1. GENERAL INSTRUCTIONS
   - The page is handwritten; read it as accurately as you can.
   - Some text spills outside the WT and REPS columns; include it.
   - Ignore personal notes and decorative text.

2. DATA TO EXTRACT
   - The date of the workout, if written on the page.
   - The muscle group targeted (e.g. Arms, Legs, Chest).
   - Every exercise listed on the page.

3. SETS AND REPS
   - For each exercise, extract every set.
   - Each set has a weight (WT) and a number of repetitions (REPS).
   - Exercises usually have 4 or 5 sets; expect at least that many.

4. OUTPUT FORMAT
   Return the extracted data in this exact JSON format:

{
  "date": "MM/DD/YYYY",
  "muscle_group": "Arms",
  "workouts": [
    {
      "exercise_name": "Exercise 1",
      "sets": [
        {"set_number": 1, "weight": "50kg", "reps": 10},
        {"set_number": 2, "weight": "55kg", "reps": 8},
        {"set_number": 3, "weight": "60kg", "reps": 6},
        {"set_number": 4, "weight": "65kg", "reps": 5},
        {"set_number": 5, "weight": "70kg", "reps": 4}
      ]
    },
    {
      "exercise_name": "Exercise 2",
      "sets": [
        {"set_number": 1, "weight": "40kg", "reps": 12},
        {"set_number": 2, "weight": "45kg", "reps": 10}
      ]
    }
  ]
}

Omit "date" or "muscle_group" if they are not on the page. Return the result strictly as JSON."#;

/// System instruction added when `strict_json` is on.
pub const STRICT_JSON_INSTRUCTION: &str = "Respond with exactly one JSON object and nothing else. \
Do not wrap it in code fences. Do not add commentary before or after it.";

/// The prompt to send: the override if one is set, else the default.
pub fn extraction_prompt(override_prompt: Option<&str>) -> &str {
    override_prompt.unwrap_or(DEFAULT_EXTRACTION_PROMPT)
}
