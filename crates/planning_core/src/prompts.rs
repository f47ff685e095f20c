//! crates/planning_core/src/prompts.rs
//!
//! Prompt text for the question and PRD generation requests.

use crate::domain::{ProjectDetails, Question, QuestionAnswer};

const QUESTIONS_SYSTEM_TEMPLATE: &str = r#"You are an experienced product manager tasked with helping to create a comprehensive Product Requirements Document (PRD) based on the provided information. Your goal is to generate a list of questions and recommendations that will be used in a follow-up prompt to create a complete PRD.

Analyze information provided by the user, focusing on aspects relevant to creating a PRD. Consider the following points:
<prd_analysis>
* Identify the main problem the product aims to solve.
* Define the key functionalities of the MVP.
* Consider potential user stories and usage paths.
* Think about success criteria and how they can be measured.
* Assess project constraints and their impact on product development.
</prd_analysis>

Based on your analysis, generate a list of questions. These should address any ambiguities, potential issues, or areas where more information is needed to create an effective PRD. Consider questions regarding:

* Details of the user problem
* Prioritization of functionalities
* Expected user experience
* Measurable success indicators
* Potential risks and challenges
* Timeline and resources

Generate exactly {count} questions, no more, and no less.
Format your response as a JSON array of strings. Example: ["Question 1", "Question 2"]"#;

const PRD_INSTRUCTIONS: &str = r#"You are an AI assistant tasked with summarizing a conversation about planning a PRD (Product Requirements Document) for an MVP and preparing a concise summary for the next stage of development. In the conversation history, you will find the following information:
1. Project description
2. Identified user problem
3. Conversation history containing questions and answers
4. Recommendations regarding PRD content

Your tasks are:
1. Summarize the conversation history, focusing on all decisions related to PRD planning.
2. Match the recommendations with the responses given in the conversation history. Identify which recommendations are relevant based on the discussion.
3. Prepare a detailed conversation summary that includes:
   a. Main functional requirements of the product
   b. Key user stories and usage paths
   c. Important success criteria and how to measure them
   d. Any unresolved issues or areas requiring further clarification
4. Format the output as follows:

### Decisions
[List the decisions made by the user, numbered].

### Recommendations
[List the most relevant recommendations matched to the conversation, numbered]

### PRD Planning Summary
[Provide a detailed summary of the conversation, including the elements listed in step 3].

### Unresolved Issues
[List any unresolved issues or areas needing further clarification, if any]

The final output should only contain content in markdown format. Make sure your summary is clear, concise, and provides valuable insights for the next stage of PRD creation."#;

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Labelled project fields, one per line, in fixed order. Empty fields are left out.
pub fn build_project_context(details: &ProjectDetails) -> String {
    let name = Some(details.name.trim()).filter(|n| !n.is_empty());
    let fields = [
        ("Project Name", name),
        ("Project Description", present(&details.description)),
        ("Main Problem", present(&details.main_problem)),
        ("Minimum Feature Set", present(&details.min_feature_set)),
        ("Out of Scope", present(&details.out_of_scope)),
        ("Success Criteria", present(&details.success_criteria)),
    ];

    fields
        .iter()
        .filter_map(|(label, value)| value.map(|v| format!("{}: {}", label, v)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn questions_system_prompt(count: usize) -> String {
    QUESTIONS_SYSTEM_TEMPLATE.replace("{count}", &count.to_string())
}

pub fn questions_user_message(context: &str, previous: &[QuestionAnswer], count: usize) -> String {
    let mut message = format!("<project_description>\n{}\n</project_description>\n", context);

    let answered: Vec<(&str, &str)> = previous
        .iter()
        .filter_map(|qa| qa.answer.as_deref().map(|a| (qa.question.as_str(), a)))
        .collect();

    if !answered.is_empty() {
        message.push_str("\nThe team has already answered the following questions:\n\n");
        for (i, (question, answer)) in answered.iter().enumerate() {
            message.push_str(&format!("Question {}: {}\nAnswer: {}\n\n", i + 1, question, answer));
        }
        message.push_str(&format!(
            "Based on these previous answers, generate {} NEW questions that build upon this information and help the team think more deeply about their project.\n",
            count
        ));
        message.push_str("Avoid asking questions that are too similar to the ones already answered.\n");
    }

    message
}

pub fn prd_prompt(context: &str, questions: &[Question]) -> String {
    let answered = questions
        .iter()
        .filter_map(|q| {
            q.answer
                .as_deref()
                .map(|a| format!("Question {}: {}\nAnswer: {}", q.sequence_number, q.question, a))
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<project_description>\n{}\n</project_description>\n\n<answered_questions>\n{}\n</answered_questions>\n\n---\n\n{}",
        context, answered, PRD_INSTRUCTIONS
    )
}
