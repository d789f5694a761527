use record_store::Store;

use crate::Types;

pub async fn run(store: &Store, types: &Types) -> Result<(), String> {
    println!("Scenario: identity");

    let shell = store.find(&types.person, 1);
    println!("find(person, 1) loaded immediately: {}", shell.is_loaded());

    let fetched = store
        .fetch(&types.person, 1)
        .await
        .map_err(|e| e.to_string())?;
    println!("fetch(person, 1) is the same record: {}", fetched.ptr_eq(&shell));

    let name = fetched.get("name").map_err(|e| e.to_string())?;
    println!("person 1 name: {}", name);

    let missing = store.fetch(&types.person, 99).await;
    if let Err(e) = missing {
        println!("fetch(person, 99): {}", e);
    }

    Ok(())
}
