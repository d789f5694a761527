mod config;
mod scenarios;

use std::sync::Arc;

use record_store::{AttributeTypeRegistry, DefaultValue, FixtureAdapter, Store, TypeDescriptor};

use config::load_config;

pub struct Types {
    pub person: Arc<TypeDescriptor>,
    pub tag: Arc<TypeDescriptor>,
}

fn declare_types() -> Result<Types, String> {
    let registry = AttributeTypeRegistry::default();
    let string = registry.get("string").map_err(|e| e.to_string())?;
    let boolean = registry.get("boolean").map_err(|e| e.to_string())?;

    Ok(Types {
        person: TypeDescriptor::builder("person")
            .attribute("name", Arc::clone(&string))
            .attribute("isDrugAddict", boolean)
            .build(),
        tag: TypeDescriptor::builder("tag")
            .attribute_with_default("name", string, DefaultValue::value("unknown"))
            .build(),
    })
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let config = load_config()?;

    let adapter = config
        .fixtures
        .into_iter()
        .fold(FixtureAdapter::new(), |adapter, (type_name, fixtures)| {
            adapter.with_fixtures(&type_name, fixtures)
        });
    let store = Store::with_adapter(config.store, Arc::new(adapter));
    let types = declare_types()?;

    scenarios::identity::run(&store, &types).await?;
    scenarios::dirty::run(&store, &types).await?;

    Ok(())
}
