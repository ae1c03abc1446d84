use anyhow::Result;
use myworld_core::{ChangeType, FeatureChange, Geometry, GetOptions, Layer};
use myworld_test_utils::{init_tracing, TestWorld, DESIGN};
use serde_json::json;

async fn world_with_pole() -> Result<TestWorld> {
    let world = TestWorld::new();
    world
        .commit_to_master(vec![FeatureChange::insert(
            world.pole("1", "P1").with_property("height", 8.5),
        )])
        .await?;
    Ok(world)
}

async fn pole_conflicts(world: &TestWorld) -> Result<Vec<myworld_core::Conflict>> {
    Ok(world.design().versioned_table("pole")?.conflicts().await?)
}

#[tokio::test]
async fn test_edit_without_master_change_has_no_conflict() -> Result<()> {
    let world = world_with_pole().await?;
    world.edit_in_design("pole/1", "name", "P1-design").await?;

    assert!(pole_conflicts(&world).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_both_sides_edit_same_field() -> Result<()> {
    init_tracing();
    let world = world_with_pole().await?;
    world.edit_in_design("pole/1", "name", "P1-design").await?;

    let master = world.live().get("pole/1", GetOptions::default()).await?.unwrap();
    world
        .commit_to_master(vec![FeatureChange::update(
            master.clone().with_property("name", "P1-master").with_property("height", 9.0),
            master,
        )])
        .await?;

    let conflicts = pole_conflicts(&world).await?;
    assert_eq!(conflicts.len(), 1);
    let conflict = &conflicts[0];
    assert_eq!(conflict.urn(), "pole/1");
    assert_eq!(conflict.master_change, ChangeType::Update);
    assert_eq!(conflict.delta_change, Some(ChangeType::Update));
    assert_eq!(conflict.master_fields, vec!["name".to_string(), "height".to_string()]);
    assert_eq!(conflict.delta_fields, vec!["name".to_string()]);
    assert_eq!(conflict.conflict_fields, vec!["name".to_string()]);
    assert!(conflict.has_field_conflicts());
    Ok(())
}

#[tokio::test]
async fn test_both_sides_make_same_edit() -> Result<()> {
    let world = world_with_pole().await?;
    world.edit_in_design("pole/1", "name", "Renamed").await?;

    let master = world.live().get("pole/1", GetOptions::default()).await?.unwrap();
    world
        .commit_to_master(vec![FeatureChange::update(master.clone().with_property("name", "Renamed"), master)])
        .await?;

    let conflicts = pole_conflicts(&world).await?;
    assert_eq!(conflicts.len(), 1);
    assert!(conflicts[0].conflict_fields.is_empty());

    let definition = serde_json::to_value(conflicts[0].definition())?;
    assert_eq!(definition["master_change"], json!("update"));
    assert!(definition.get("conflict_fields").is_none());
    assert!(definition.get("base").is_some());
    Ok(())
}

#[tokio::test]
async fn test_master_delete_of_edited_record() -> Result<()> {
    let world = world_with_pole().await?;
    world.edit_in_design("pole/1", "name", "Kept").await?;

    let master = world.live().get("pole/1", GetOptions::default()).await?.unwrap();
    world.commit_to_master(vec![FeatureChange::delete(master)]).await?;

    let conflicts = pole_conflicts(&world).await?;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].master_change, ChangeType::Delete);
    assert!(conflicts[0].master_rec.is_none());
    assert!(conflicts[0].conflict_fields.is_empty());

    let definition = serde_json::to_value(conflicts[0].definition())?;
    assert!(definition.get("master").is_none());
    Ok(())
}

#[tokio::test]
async fn test_both_sides_insert_same_id() -> Result<()> {
    let world = TestWorld::new();
    world
        .design()
        .apply_changes(vec![FeatureChange::insert(world.pole("9", "Design pole"))])
        .await?;
    world
        .commit_to_master(vec![FeatureChange::insert(world.pole("9", "Master pole"))])
        .await?;

    let conflicts = pole_conflicts(&world).await?;
    assert_eq!(conflicts.len(), 1);
    let conflict = &conflicts[0];
    assert_eq!(conflict.master_change, ChangeType::Insert);
    assert_eq!(conflict.delta_change, Some(ChangeType::Insert));
    assert!(conflict.base_rec.is_none());
    // No base to diff against
    assert!(conflict.master_fields.is_empty());
    assert!(conflict.conflict_fields.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_geometry_compared_strictly() -> Result<()> {
    let world = world_with_pole().await?;
    let design = world.design();
    let orig = design.get("pole/1", GetOptions::default()).await?.unwrap();
    design
        .apply_changes(vec![FeatureChange::update(
            orig.clone().with_geometry(Geometry::point(0.0, 0.000001)),
            orig,
        )])
        .await?;

    let master = world.live().get("pole/1", GetOptions::default()).await?.unwrap();
    world
        .commit_to_master(vec![FeatureChange::update(
            master.clone().with_geometry(Geometry::point(0.000001, 0.0)),
            master,
        )])
        .await?;

    let conflicts = pole_conflicts(&world).await?;
    assert_eq!(conflicts[0].conflict_fields, vec!["location".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_loosely_equal_values_are_unchanged() -> Result<()> {
    let world = world_with_pole().await?;
    world.edit_in_design("pole/1", "height", "8.5").await?;

    let master = world.live().get("pole/1", GetOptions::default()).await?.unwrap();
    world
        .commit_to_master(vec![FeatureChange::update(master.clone().with_property("name", "P1b"), master)])
        .await?;

    let conflicts = pole_conflicts(&world).await?;
    assert_eq!(conflicts.len(), 1);
    assert!(conflicts[0].delta_fields.is_empty());
    assert!(conflicts[0].conflict_fields.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_seeded_layers_without_views() -> Result<()> {
    let world = TestWorld::new();
    world.seed(Layer::Base(DESIGN.into()), vec![world.pole("4", "Base")]);
    world.seed(Layer::Master, vec![world.pole("4", "Master")]);
    world.seed(
        Layer::Delta(DESIGN.into()),
        vec![world.pole("4", "Delta").with_change_type(ChangeType::Update)],
    );

    let conflicts = pole_conflicts(&world).await?;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].conflict_fields, vec!["name".to_string()]);
    Ok(())
}
