// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::Parser;
use governance_vote_collector::runtime::ServerArgs;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    args.run().await
}
