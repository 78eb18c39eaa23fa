// SPDX-License-Identifier: Apache-2.0

//! Governance parameters singleton, replaced wholesale on a `ParametersChanged` event
//! (spec §4.10 `applyParametersChanged`). Opaque to this core beyond persistence: the
//! voting-power strategy in effect is a deployment-time configuration choice, not
//! re-derived from this row.

use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{errors::CollectorError, schema::governance_parameters};

pub async fn replace(
    conn: &mut AsyncPgConnection,
    params: serde_json::Value,
) -> Result<(), CollectorError> {
    diesel::insert_into(governance_parameters::table)
        .values((
            governance_parameters::id.eq(1_i16),
            governance_parameters::params.eq(&params),
        ))
        .on_conflict(governance_parameters::id)
        .do_update()
        .set((
            governance_parameters::params.eq(&params),
            governance_parameters::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn get(
    conn: &mut AsyncPgConnection,
) -> Result<Option<serde_json::Value>, CollectorError> {
    use diesel::OptionalExtension;
    governance_parameters::table
        .select(governance_parameters::params)
        .filter(governance_parameters::id.eq(1_i16))
        .first::<serde_json::Value>(conn)
        .await
        .optional()
        .map_err(CollectorError::from)
}
