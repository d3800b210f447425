//! Planner prompt assembly.

use super::PlanRequest;
use std::fmt::Write;

const PREAMBLE: &str = "\
You are a reasoning-driven agent with access to tools and memory.
Solve the user's request step by step: pick one tool per step, read its result
from memory, and finish with the final answer.

Respond with exactly one line in one of these formats:
- FUNCTION_CALL: tool_name|param1=value1|param2=value2
- FINAL_ANSWER: [your final result]";

const EXAMPLES: &str = "\
Examples:
- FUNCTION_CALL: add|a=5|b=3
- FUNCTION_CALL: strings_to_chars_to_int|input.string=INDIA
- FUNCTION_CALL: int_list_to_exponential_sum|input.int_list=[73,78,68,73,65]
- FUNCTION_CALL: send_message|chat_id=\"123456\"|text=\"hello bot\"
- FUNCTION_CALL: update_spreadsheet|title=\"Budget\"|range=\"A1:B2\"|value=[[1,2],[4,5]]
- FINAL_ANSWER: [42]";

const RULES: &str = "\
Rules:
- Use only the tools listed above, with the parameters their usage shows.
- Use dotted keys like input.string for nested parameters and [a,b] for lists.
- Quote values that contain | or spaces.
- Never repeat a tool call with the same parameters unless its result was empty.
- If memory already holds the result you need, answer with FINAL_ANSWER.
- The final answer is the actual result, not a description of it.
- Never output explanations, only the single FUNCTION_CALL or FINAL_ANSWER line.
- If no tool fits or you are unsure, answer: FINAL_ANSWER: [unknown]";

/// Render the full prompt for one planning step.
pub fn build_prompt(request: &PlanRequest<'_>) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(PREAMBLE);
    prompt.push_str("\n\n");

    let remaining = request.step_budget.saturating_sub(request.step) + 1;
    let _ = writeln!(
        prompt,
        "Step {} of {} ({remaining} remaining, including this one).",
        request.step, request.step_budget
    );

    prompt.push_str("\nAvailable tools:\n");
    if request.tools.is_empty() {
        prompt.push_str("- None\n");
    }
    for tool in request.tools {
        let _ = writeln!(prompt, "- {}: {}", tool.signature(), tool.usage);
    }

    prompt.push_str("\nMemory:\n");
    if request.memory.is_empty() {
        prompt.push_str("- None\n");
    }
    for item in request.memory {
        let _ = writeln!(prompt, "- {}", item.content);
    }

    let perception = request.perception;
    prompt.push_str("\nInput summary:\n");
    let _ = writeln!(prompt, "- User input: \"{}\"", perception.user_input);
    if !perception.intent.is_empty() {
        let _ = writeln!(prompt, "- Intent: {}", perception.intent);
    }
    if !perception.entities.is_empty() {
        let _ = writeln!(prompt, "- Entities: {}", perception.entities.join(", "));
    }
    let _ = writeln!(
        prompt,
        "- Tool hint: {}",
        perception.tool_hint.as_deref().unwrap_or("None")
    );

    if !request.facts.is_empty() {
        prompt.push_str("\nContext:\n");
        for (key, value) in request.facts {
            let _ = writeln!(prompt, "- {key}: {value}");
        }
        prompt.push_str("- Use these values exactly as given wherever a tool needs them.\n");
    }

    prompt.push('\n');
    prompt.push_str(EXAMPLES);
    prompt.push_str("\n\n");
    prompt.push_str(RULES);
    prompt.push('\n');

    if request.must_finalize {
        prompt.push_str(
            "\nYou already have the result of the call you were about to repeat. \
             Respond now with FINAL_ANSWER; any FUNCTION_CALL will be ignored.\n",
        );
    } else if request.step >= request.step_budget {
        prompt.push_str("\nThis is the last step. It must end with FINAL_ANSWER.\n");
    }

    prompt
}
