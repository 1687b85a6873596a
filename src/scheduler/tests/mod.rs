//! Tests for the scheduling loop and its collaborators.

mod policy_tests;
mod preempt_tests;
