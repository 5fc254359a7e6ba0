//! Scene serialization
//!
//! A [`Scene`] is a list of entity templates plus world settings, stored as
//! RON. Instantiating a scene adds its entities to a [`PhysicsWorld`].

use serde::{Serialize, Deserialize};
use std::fs;
use std::io;
use std::path::Path;

use kinetic2d_math::Vec2;
use kinetic2d_physics::{BodyDef, BodyType, FixtureDef, CircleShape, PhysicsMaterial, PhysicsResult};

use crate::entity::{Entity, EntityKey, EntityType};
use crate::hitbox::HitBox;
use crate::physics_component::PhysicsComponent;
use crate::physics_world::PhysicsWorld;

fn default_true() -> bool {
    true
}

/// Rigid body settings of an entity template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyTemplate {
    pub body_type: BodyType,
    #[serde(default)]
    pub material: PhysicsMaterial,
    #[serde(default)]
    pub fixed_rotation: bool,
    #[serde(default)]
    pub bullet: bool,
    #[serde(default)]
    pub raycast_ignored: bool,
    /// Initial velocity in pixels per second
    #[serde(default)]
    pub velocity: Option<[f32; 2]>,
}

impl BodyTemplate {
    pub fn new(body_type: BodyType) -> Self {
        Self {
            body_type,
            material: PhysicsMaterial::default(),
            fixed_rotation: false,
            bullet: false,
            raycast_ignored: false,
            velocity: None,
        }
    }

    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn with_velocity(mut self, vx: f32, vy: f32) -> Self {
        self.velocity = Some([vx, vy]);
        self
    }

    fn to_component(&self) -> PhysicsComponent {
        let body_def = BodyDef::new(self.body_type)
            .with_fixed_rotation(self.fixed_rotation)
            .with_bullet(self.bullet);
        let mut component = PhysicsComponent::new()
            .with_body_def(body_def)
            .with_fixture_def(FixtureDef::new(CircleShape::default()).with_material(self.material))
            .with_raycast_ignored(self.raycast_ignored);

        if let Some([vx, vy]) = self.velocity {
            component = component.on_initialized(move |body, units| {
                body.set_linear_velocity(units.to_vector(Vec2::new(vx, vy)));
            });
        }
        component
    }
}

/// Serializable description of an entity
///
/// Positions are pixels (top-left corner), rotation is clockwise degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTemplate {
    pub entity_type: EntityType,
    #[serde(default)]
    pub name: Option<String>,
    pub position: [f32; 2],
    #[serde(default)]
    pub rotation: f32,
    pub hit_boxes: Vec<HitBox>,
    #[serde(default = "default_true")]
    pub collidable: bool,
    #[serde(default)]
    pub ignored_types: Vec<EntityType>,
    /// Entities without a body only take part in hit box overlap checks
    #[serde(default)]
    pub body: Option<BodyTemplate>,
}

impl EntityTemplate {
    pub fn new(entity_type: impl Into<EntityType>, x: f32, y: f32) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: None,
            position: [x, y],
            rotation: 0.0,
            hit_boxes: Vec::new(),
            collidable: true,
            ignored_types: Vec::new(),
            body: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_hit_box(mut self, hit_box: HitBox) -> Self {
        self.hit_boxes.push(hit_box);
        self
    }

    pub fn with_body(mut self, body: BodyTemplate) -> Self {
        self.body = Some(body);
        self
    }

    /// Build a fresh entity from this template
    pub fn to_entity(&self) -> Entity {
        let [x, y] = self.position;
        let mut entity = Entity::new(self.entity_type.clone())
            .at(x, y)
            .with_rotation(self.rotation)
            .with_collidable(self.collidable);

        if let Some(name) = &self.name {
            entity = entity.with_name(name.clone());
        }
        for hit_box in &self.hit_boxes {
            entity = entity.with_hit_box(hit_box.clone());
        }
        for ignored in &self.ignored_types {
            entity = entity.with_ignored_type(ignored.clone());
        }
        if let Some(body) = &self.body {
            entity = entity.with_physics(body.to_component());
        }
        entity
    }
}

/// A serializable scene containing entity templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Scene name (for display/debugging)
    pub name: String,
    /// Gravity in pixels per second squared, y down
    #[serde(default)]
    pub gravity: Option<[f32; 2]>,
    pub entities: Vec<EntityTemplate>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gravity: None,
            entities: Vec::new(),
        }
    }

    pub fn with_gravity(mut self, x: f32, y: f32) -> Self {
        self.gravity = Some([x, y]);
        self
    }

    pub fn add_entity(&mut self, entity: EntityTemplate) {
        self.entities.push(entity);
    }

    /// Load a scene from a RON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SceneLoadError> {
        let contents = fs::read_to_string(path)?;
        let scene = ron::from_str(&contents)?;
        Ok(scene)
    }

    /// Save the scene to a RON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SceneSaveError> {
        let pretty = ron::ser::PrettyConfig::new()
            .struct_names(true)
            .enumerate_arrays(false);
        let contents = ron::ser::to_string_pretty(self, pretty)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Add every entity to `world`, applying the scene gravity if set
    ///
    /// Stops at the first entity the world rejects; entities added before it
    /// stay in the world.
    pub fn instantiate(&self, world: &mut PhysicsWorld) -> PhysicsResult<Vec<EntityKey>> {
        if let Some([x, y]) = self.gravity {
            world.set_gravity(x, y);
        }

        let keys = self
            .entities
            .iter()
            .map(|template| world.add_entity(template.to_entity()))
            .collect::<PhysicsResult<Vec<_>>>()?;

        log::debug!("Instantiated scene '{}' with {} entities", self.name, keys.len());
        Ok(keys)
    }
}

/// Error loading a scene
#[derive(Debug)]
pub enum SceneLoadError {
    /// IO error (file not found, permission denied, etc.)
    Io(io::Error),
    /// Parse error (invalid RON syntax)
    Parse(ron::error::SpannedError),
}

impl From<io::Error> for SceneLoadError {
    fn from(e: io::Error) -> Self {
        SceneLoadError::Io(e)
    }
}

impl From<ron::error::SpannedError> for SceneLoadError {
    fn from(e: ron::error::SpannedError) -> Self {
        SceneLoadError::Parse(e)
    }
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::Io(e) => write!(f, "IO error: {}", e),
            SceneLoadError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for SceneLoadError {}

/// Error saving a scene
#[derive(Debug)]
pub enum SceneSaveError {
    Io(io::Error),
    Serialize(ron::Error),
}

impl From<io::Error> for SceneSaveError {
    fn from(e: io::Error) -> Self {
        SceneSaveError::Io(e)
    }
}

impl From<ron::Error> for SceneSaveError {
    fn from(e: ron::Error) -> Self {
        SceneSaveError::Serialize(e)
    }
}

impl std::fmt::Display for SceneSaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneSaveError::Io(e) => write!(f, "IO error: {}", e),
            SceneSaveError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for SceneSaveError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitbox::BoundingShape;

    fn sample_scene() -> Scene {
        let mut scene = Scene::new("Playground").with_gravity(0.0, 400.0);
        scene.add_entity(
            EntityTemplate::new("ground", 0.0, 550.0)
                .with_name("floor")
                .with_hit_box(HitBox::new("body", BoundingShape::rectangle(800.0, 50.0)))
                .with_body(BodyTemplate::new(BodyType::Static)),
        );
        scene.add_entity(
            EntityTemplate::new("ball", 100.0, 100.0)
                .with_hit_box(HitBox::new("body", BoundingShape::circle(10.0)))
                .with_body(
                    BodyTemplate::new(BodyType::Dynamic)
                        .with_material(PhysicsMaterial::RUBBER)
                        .with_velocity(50.0, 0.0),
                ),
        );
        scene.add_entity(
            EntityTemplate::new("coin", 300.0, 500.0)
                .with_hit_box(HitBox::new("body", BoundingShape::rectangle(16.0, 16.0))),
        );
        scene
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("kinetic2d_{}_{}.ron", name, std::process::id()))
    }

    #[test]
    fn test_scene_new() {
        let scene = Scene::new("Empty");
        assert_eq!(scene.name, "Empty");
        assert!(scene.entities.is_empty());
        assert!(scene.gravity.is_none());
    }

    #[test]
    fn test_template_to_entity() {
        let template = EntityTemplate::new("ball", 10.0, 20.0)
            .with_name("b1")
            .with_hit_box(HitBox::new("body", BoundingShape::circle(5.0)))
            .with_body(BodyTemplate::new(BodyType::Dynamic));
        let entity = template.to_entity();
        assert_eq!(entity.entity_type().as_str(), "ball");
        assert_eq!(entity.name.as_deref(), Some("b1"));
        assert_eq!(entity.position, Vec2::new(10.0, 20.0));
        assert_eq!(entity.hit_boxes().len(), 1);
        assert_eq!(entity.physics().unwrap().body_type(), BodyType::Dynamic);
    }

    #[test]
    fn test_scene_serialization() {
        let scene = sample_scene();
        let pretty = ron::ser::PrettyConfig::new().struct_names(true);
        let serialized = ron::ser::to_string_pretty(&scene, pretty).unwrap();
        assert!(serialized.contains("Playground"));
        assert!(serialized.contains("floor"));

        let loaded: Scene = ron::from_str(&serialized).unwrap();
        assert_eq!(loaded, scene);
    }

    #[test]
    fn test_optional_fields_default() {
        let ron = r#"Scene(
            name: "Minimal",
            entities: [
                EntityTemplate(
                    entity_type: "wall",
                    position: (0.0, 0.0),
                    hit_boxes: [["body", 0.0, 0.0, 10.0, 10.0, Box]],
                ),
            ],
        )"#;
        let scene: Scene = ron::from_str(ron).unwrap();
        let wall = &scene.entities[0];
        assert!(wall.collidable);
        assert!(wall.body.is_none());
        assert!(wall.ignored_types.is_empty());
        assert_eq!(wall.hit_boxes[0].shape(), &BoundingShape::rectangle(10.0, 10.0));
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("save_and_load");
        let scene = sample_scene();
        scene.save(&path).unwrap();
        let loaded = Scene::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, scene);
    }

    #[test]
    fn test_load_missing_file() {
        match Scene::load("/nonexistent/scene.ron") {
            Err(SceneLoadError::Io(_)) => {}
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_invalid_ron() {
        let path = temp_path("invalid");
        std::fs::write(&path, "Scene(name: ").unwrap();
        let result = Scene::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(SceneLoadError::Parse(_))));
    }

    #[test]
    fn test_instantiate() {
        let mut world = PhysicsWorld::new(600.0, 50.0);
        let keys = sample_scene().instantiate(&mut world).unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(world.entity_count(), 3);
        assert_eq!(world.world().body_count(), 2);
        assert_eq!(world.find_by_name("floor"), Some(keys[0]));

        let g = world.gravity();
        assert!((g.y - 400.0).abs() < 1e-3);

        let v = world.physics(keys[1]).unwrap().linear_velocity().unwrap();
        assert!((v.x - 50.0).abs() < 1e-3);
    }
}
