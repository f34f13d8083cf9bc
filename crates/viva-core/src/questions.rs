//! The fixed screening questionnaire. Shared by every candidate; `q_index` points into it.

pub const QUESTIONS: [&str; 6] = [
    "How many years of experience do you have?",
    "What is your current CTC?",
    "What is your expected CTC?",
    "Which is your current location?",
    "Are you open to relocation?",
    "What is your notice period?",
];

pub const QUESTION_COUNT: usize = QUESTIONS.len();

pub fn question(index: usize) -> Option<&'static str> {
    QUESTIONS.get(index).copied()
}
