//! Environment source: `ANNAL_<SECTION>__<KEY>`, e.g. `ANNAL_LEDGER__SEED=7`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("ANNAL")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    )
}
