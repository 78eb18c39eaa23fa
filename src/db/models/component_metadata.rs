// SPDX-License-Identifier: Apache-2.0

//! Cache of the governance component's earliest relevant ledger version (spec §4.7
//! step 3). Read from the component's creation state-version field on first startup and
//! cached here so Reconciliation doesn't re-derive it on every restart.

use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{errors::CollectorError, schema::component_metadata};

pub async fn get_first_relevant_version(
    conn: &mut AsyncPgConnection,
) -> Result<Option<i64>, CollectorError> {
    let version = component_metadata::table
        .select(component_metadata::first_relevant_version)
        .filter(component_metadata::id.eq(1))
        .first::<i64>(conn)
        .await
        .optional()?;
    Ok(version)
}

pub async fn set_first_relevant_version(
    conn: &mut AsyncPgConnection,
    version: i64,
) -> Result<(), CollectorError> {
    diesel::insert_into(component_metadata::table)
        .values((
            component_metadata::id.eq(1_i16),
            component_metadata::first_relevant_version.eq(version),
        ))
        .on_conflict(component_metadata::id)
        .do_nothing()
        .execute(conn)
        .await?;
    Ok(())
}
