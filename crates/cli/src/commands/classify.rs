//! `forgeloop classify`: show the planning decision for a message.

use forgeloop_agent::should_generate_task_plan;

pub fn run(message: &str) {
    if should_generate_task_plan(message) {
        println!("plan: multi-step objective, a task plan will be generated");
    } else {
        println!("direct: single action, the loop runs without a plan");
    }
}
