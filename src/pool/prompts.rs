//! Prompt construction for generation, the three judge stages and problem
//! classification.

use crate::models::{Problem, Stage};

const DISTINCTNESS_CRITERIA: &str = "\
Criteria for evaluating the difference between two mathematical solutions include:
i). If the methods used to arrive at the solutions are fundamentally different, such as algebraic manipulation versus geometric reasoning, they can be considered distinct;
ii). Even if the final results are the same, if the intermediate steps or processes involved in reaching those solutions vary significantly, the solutions can be considered different;
iii). If two solutions rely on different assumptions or conditions, they are likely to be distinct;
iv). A solution might generalize to a broader class of problems, while another solution might be specific to certain conditions. In such cases, they are considered distinct;
v). If one solution is significantly simpler or more complex than the other, they can be regarded as essentially different, even if they lead to the same result.";

const NOVELTY_CRITERIA: &str = "\
Criteria for evaluating the novelty of a new mathematical solution include:
1. If the new solution is fundamentally different from the reference solutions, such as algebraic manipulation versus geometric reasoning, it can be considered novel;
2. Even if the final results are the same, if the intermediate steps or processes vary significantly, the new solution can be considered novel;
3. If the new solution relies on different assumptions or conditions, it should be considered novel;
4. If the new solution generalizes to a broader class of problems while the references are specific to certain conditions, it is considered distinct;
5. If the new solution is significantly simpler or more complex than the others, it can be regarded as essentially novel, even if they lead to the same result.";

/// Labels `MathCategory::from_label` recognizes.
const CATEGORY_CHOICES: &str =
    "arithmetic, algebra, counting, geometry, number theory, probability, or other";

/// Numbered "Solution i:" blocks.
fn enumerate_solutions(solutions: &[String]) -> String {
    solutions
        .iter()
        .enumerate()
        .map(|(i, s)| format!("Solution {}:\n{}\n\n", i + 1, s))
        .collect()
}

/// Ask for a solution distinct from the first `k` references.
pub fn generation_prompt(problem: &Problem, k: usize) -> String {
    let k = k.min(problem.n());
    format!(
        "{DISTINCTNESS_CRITERIA}\n\nGiven the following mathematical problem:\n{}\n\n\
         And some typical solutions:\n{}\
         Please output a novel solution distinct from the given ones for this math problem.",
        problem.text,
        enumerate_solutions(&problem.reference_solutions[..k]),
    )
}

/// Judge prompt for `stage`, or `None` when the stage has no question to
/// ask (fine novelty once every reference was already in context).
///
/// Correctness and coarse novelty compare against the first `k`
/// references; fine novelty compares against the rest.
pub fn judge_prompt(stage: Stage, problem: &Problem, k: usize, response: &str) -> Option<String> {
    let refs = &problem.reference_solutions;
    let k = k.min(refs.len());

    let (preamble, references, question) = match stage {
        Stage::Correctness => (
            None,
            &refs[..k],
            "Please output YES if the new solution leads to the same result as the reference solutions; otherwise, output NO.",
        ),
        Stage::CoarseNovelty => (
            Some(NOVELTY_CRITERIA),
            &refs[..k],
            "Please output YES if the new solution is a novel solution; otherwise, output NO.",
        ),
        Stage::FineNovelty => {
            if k == refs.len() {
                return None;
            }
            (
                Some(NOVELTY_CRITERIA),
                &refs[k..],
                "Please output YES if the new solution is a novel solution; otherwise, output NO.",
            )
        }
    };

    let mut prompt = String::new();
    if let Some(preamble) = preamble {
        prompt.push_str(preamble);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!(
        "Given the following mathematical problem:\n{}\n\nReference solutions:\n{}\
         New solution:\n{}\n\n{}",
        problem.text,
        enumerate_solutions(references),
        response,
        question
    ));
    Some(prompt)
}

/// Ask for the main concept and category of a problem, shown with its
/// first reference solution when it has one.
pub fn classification_prompt(problem: &Problem) -> String {
    let mut prompt = format!(
        "Please identify the main concept involved in the problem. Classify the following math \
         problem into one of the following categories: {CATEGORY_CHOICES}. Provide a brief \
         explanation of your choice.\n\n**Problem:**\n{}\n\n",
        problem.text
    );
    if let Some(solution) = problem.reference_solutions.first() {
        prompt.push_str(&format!("**Solution:**\n{solution}\n\n"));
    }
    prompt.push_str(
        "**Instructions:**\n\
         1. Identify the main concept or concepts involved in the problem.\n\
         2. Choose the category that best represents the main concept(s).\n\
         3. Explain why you chose the selected category.\n\n\
         **Expected Output:**\nConcept: []\nCategory: []\nSimple Explanation: []",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompetitionType;

    fn problem() -> Problem {
        Problem {
            problem_id: "AIME_1990_1".to_string(),
            competition: CompetitionType::Aime,
            competition_id: "1990_AIME_Problems".to_string(),
            text: "Find the 500th term.".to_string(),
            reference_solutions: vec!["REF-A".into(), "REF-B".into(), "REF-C".into()],
        }
    }

    #[test]
    fn test_generation_prompt_uses_first_k() {
        let prompt = generation_prompt(&problem(), 2);
        assert!(prompt.contains("Solution 1:\nREF-A"));
        assert!(prompt.contains("Solution 2:\nREF-B"));
        assert!(!prompt.contains("REF-C"));
    }

    #[test]
    fn test_stage_reference_slices() {
        let p = problem();

        let correctness = judge_prompt(Stage::Correctness, &p, 1, "mine").unwrap();
        assert!(correctness.contains("REF-A") && !correctness.contains("REF-B"));

        let coarse = judge_prompt(Stage::CoarseNovelty, &p, 2, "mine").unwrap();
        assert!(coarse.contains("REF-B") && !coarse.contains("REF-C"));

        let fine = judge_prompt(Stage::FineNovelty, &p, 2, "mine").unwrap();
        assert!(fine.contains("Solution 1:\nREF-C"));
        assert!(!fine.contains("REF-A") && !fine.contains("REF-B"));
        assert!(fine.contains("New solution:\nmine"));
    }

    #[test]
    fn test_fine_prompt_absent_when_all_references_seen() {
        assert_eq!(judge_prompt(Stage::FineNovelty, &problem(), 3, "mine"), None);
    }

    #[test]
    fn test_classification_prompt_lists_categories_and_first_solution() {
        let prompt = classification_prompt(&problem());
        assert!(prompt.contains("arithmetic, algebra, counting, geometry, number theory, probability, or other"));
        assert!(prompt.contains("**Problem:**\nFind the 500th term."));
        assert!(prompt.contains("**Solution:**\nREF-A"));
        assert!(!prompt.contains("REF-B"));
        assert!(prompt.ends_with("Category: []\nSimple Explanation: []"));

        let mut bare = problem();
        bare.reference_solutions.clear();
        assert!(!classification_prompt(&bare).contains("**Solution:**"));
    }
}
