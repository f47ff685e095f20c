//! crates/planning_core/src/fallback.rs
//!
//! A fixed bank of planning questions used when the model cannot be reached
//! or returns something unusable.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::GeneratedQuestion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionCategory {
    UserResearch,
    ProblemDefinition,
    MarketAnalysis,
    Technical,
    Business,
    Timeline,
    SuccessMetrics,
}

impl QuestionCategory {
    pub const ALL: [QuestionCategory; 7] = [
        QuestionCategory::UserResearch,
        QuestionCategory::ProblemDefinition,
        QuestionCategory::MarketAnalysis,
        QuestionCategory::Technical,
        QuestionCategory::Business,
        QuestionCategory::Timeline,
        QuestionCategory::SuccessMetrics,
    ];

    pub fn templates(&self) -> &'static [&'static str] {
        match self {
            QuestionCategory::UserResearch => &[
                "Who is the primary user persona for this project?",
                "What are the key pain points your users are experiencing?",
                "How do you plan to gather user feedback during development?",
                "What user research have you conducted so far?",
                "What are the primary user journeys for your product?",
            ],
            QuestionCategory::ProblemDefinition => &[
                "What specific problem does this project solve?",
                "How is this problem currently being solved?",
                "Why is now the right time to solve this problem?",
                "What are the consequences if this problem remains unsolved?",
                "How did you validate that this problem is worth solving?",
            ],
            QuestionCategory::MarketAnalysis => &[
                "Who are your main competitors in this space?",
                "What is your unique value proposition?",
                "What existing solutions have you researched?",
                "How large is the target market for this product?",
                "What market trends support the need for your solution?",
            ],
            QuestionCategory::Technical => &[
                "What technical constraints are you working with?",
                "What technology stack do you plan to use?",
                "What are the potential technical challenges you foresee?",
                "How will you ensure the solution is scalable?",
                "What security considerations are important for this project?",
            ],
            QuestionCategory::Business => &[
                "What is your budget for this project?",
                "How do you plan to monetize this solution?",
                "What is the expected ROI for this project?",
                "What business metrics will you track?",
                "How does this project align with your overall business strategy?",
            ],
            QuestionCategory::Timeline => &[
                "What is your timeline for launching this project?",
                "What are the key milestones for this project?",
                "How have you prioritized features for the initial release?",
                "What is your release strategy?",
                "How will you manage scope to meet your timeline?",
            ],
            QuestionCategory::SuccessMetrics => &[
                "What metrics will you use to measure success?",
                "How will you know if this project is successful?",
                "What are your KPIs for this project?",
                "How will you gather feedback after launch?",
                "What would make this project a failure in your view?",
            ],
        }
    }

    /// The category a template text belongs to, if it is one of ours.
    pub fn of(question: &str) -> Option<QuestionCategory> {
        Self::ALL
            .into_iter()
            .find(|category| category.templates().contains(&question))
    }
}

fn pick<R: Rng>(rng: &mut R, category: QuestionCategory) -> &'static str {
    let templates = category.templates();
    templates[rng.random_range(0..templates.len())]
}

/// Picks `count` template questions numbered from `start_sequence_number`.
///
/// The first `min(7, count)` come from distinct categories in shuffled order;
/// any further slots draw a random category and template, repeats allowed.
pub fn fallback_questions<R: Rng>(
    rng: &mut R,
    count: usize,
    start_sequence_number: i32,
) -> Vec<GeneratedQuestion> {
    let mut categories = QuestionCategory::ALL;
    categories.shuffle(rng);

    let distinct = count.min(categories.len());
    let mut picked: Vec<&'static str> = categories[..distinct]
        .iter()
        .map(|category| pick(rng, *category))
        .collect();

    while picked.len() < count {
        let category = QuestionCategory::ALL[rng.random_range(0..QuestionCategory::ALL.len())];
        picked.push(pick(rng, category));
    }

    picked
        .into_iter()
        .zip(start_sequence_number..)
        .map(|(question, sequence_number)| GeneratedQuestion {
            question: question.to_string(),
            sequence_number,
        })
        .collect()
}
