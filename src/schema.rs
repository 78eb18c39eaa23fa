// @generated manually — mirrors migrations/ under this crate.
// SPDX-License-Identifier: Apache-2.0

diesel::table! {
    transaction_cursor (id) {
        id -> Int2,
        state_version -> Int8,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    component_metadata (id) {
        id -> Int2,
        first_relevant_version -> Int8,
    }
}

diesel::table! {
    dedup_entries (tx_id) {
        tx_id -> Text,
        inserted_at -> Timestamptz,
    }
}

diesel::table! {
    proposals (id) {
        id -> Int8,
        title -> Text,
        short_description -> Text,
        description -> Text,
        vote_options -> Jsonb,
        max_selections -> Int4,
        start_version -> Nullable<Int8>,
        end_version -> Nullable<Int8>,
        quorum -> Numeric,
        approval_threshold -> Numeric,
        hidden -> Bool,
        voter_kvs_address -> Text,
        vote_kvs_address -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    temperature_checks (id) {
        id -> Int8,
        title -> Text,
        short_description -> Text,
        description -> Text,
        vote_options -> Jsonb,
        max_selections -> Int4,
        start_version -> Nullable<Int8>,
        end_version -> Nullable<Int8>,
        quorum -> Numeric,
        approval_threshold -> Numeric,
        hidden -> Bool,
        voter_kvs_address -> Text,
        vote_kvs_address -> Text,
        promoted_to_proposal_id -> Nullable<Int8>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    vote_records (poll_kind, poll_id, voter_account) {
        poll_kind -> Text,
        poll_id -> Int8,
        voter_account -> Text,
        selections -> Jsonb,
        voting_power -> Numeric,
        anchoring_state_version -> Int8,
        cast_at_state_version -> Int8,
        revote_count -> Int4,
        voting_power_pending -> Bool,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    vote_tallies (poll_kind, poll_id, option_id) {
        poll_kind -> Text,
        poll_id -> Int8,
        option_id -> Text,
        tally -> Numeric,
    }
}

diesel::table! {
    recompute_triggers (trigger_id) {
        trigger_id -> Int8,
        voter_account -> Text,
        poll_id -> Int8,
        poll_kind -> Text,
        anchoring_state_version -> Int8,
        attempts -> Int4,
        next_attempt_at -> Timestamptz,
        status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    governance_parameters (id) {
        id -> Int2,
        params -> Jsonb,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    dead_letters (id) {
        id -> Int8,
        state_version -> Int8,
        intent_hash -> Text,
        error_kind -> Text,
        error_details -> Text,
        recorded_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    transaction_cursor,
    component_metadata,
    dedup_entries,
    proposals,
    temperature_checks,
    vote_records,
    vote_tallies,
    recompute_triggers,
    governance_parameters,
    dead_letters,
);
