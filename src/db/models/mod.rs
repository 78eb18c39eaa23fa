// SPDX-License-Identifier: Apache-2.0

pub mod component_metadata;
pub mod cursor;
pub mod dead_letter;
pub mod dedup;
pub mod governance_parameters;
pub mod poll;
pub mod recompute_trigger;
pub mod vote_record;
pub mod vote_tally;
