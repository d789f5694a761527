use record_store::Store;

use crate::Types;

pub async fn run(store: &Store, types: &Types) -> Result<(), String> {
    println!("Scenario: dirty tracking");

    let person = store
        .fetch(&types.person, 2)
        .await
        .map_err(|e| e.to_string())?;

    person.set("name", "Katz").map_err(|e| e.to_string())?;
    println!("after setting the same name, dirty: {}", person.is_dirty());

    person.set("name", "Brohuda Katz").map_err(|e| e.to_string())?;
    println!("after renaming, dirty: {}", person.is_dirty());

    store.save(&person).await.map_err(|e| e.to_string())?;
    println!("after save, dirty: {}", person.is_dirty());

    let tag = store.create_record(&types.tag);
    println!("new tag name: {}", tag.get("name").map_err(|e| e.to_string())?);
    tag.set("name", None::<&str>).map_err(|e| e.to_string())?;
    println!("tag name after clearing: {}", tag.get("name").map_err(|e| e.to_string())?);

    store.save(&tag).await.map_err(|e| e.to_string())?;
    println!("saved tag id: {:?}", tag.id());

    Ok(())
}
