use ipolens_core::{Aggregator, Category};
use serde_json::Value;

use crate::cli::IposArgs;
use crate::error::CliError;

pub async fn run(args: &IposArgs, aggregator: &Aggregator) -> Result<Value, CliError> {
    let result = aggregator.ipos(Category::from(args.kind)).await?;
    Ok(serde_json::to_value(result)?)
}
