//! Demo persons loaded into a fresh database.

use crate::detector::{random_embedding, random_id};
use crate::providers::ProviderProfile;
use crate::types::{
    DetectedFace, Emotion, FaceAttributes, FaceCoordinates, FaceQuality, Gender, Person,
    PersonCategory, TrainingStatus,
};
use chrono::Utc;
use rand::Rng;

const SEED_IMAGE_BASE: &str = "https://images.facetag.example/seed";

struct SeedPerson {
    name: &'static str,
    aliases: &'static [&'static str],
    category: PersonCategory,
    verified: bool,
    faces: usize,
    gender: Gender,
}

const SEED_PERSONS: &[SeedPerson] = &[
    SeedPerson {
        name: "Amara Okafor",
        aliases: &["Amara O."],
        category: PersonCategory::Model,
        verified: true,
        faces: 3,
        gender: Gender::Female,
    },
    SeedPerson {
        name: "Lucas Bennett",
        aliases: &[],
        category: PersonCategory::Photographer,
        verified: true,
        faces: 2,
        gender: Gender::Male,
    },
    SeedPerson {
        name: "Sofia Marquez",
        aliases: &["Sofi", "S. Marquez"],
        category: PersonCategory::Celebrity,
        verified: false,
        faces: 4,
        gender: Gender::Female,
    },
    SeedPerson {
        name: "Kenji Watanabe",
        aliases: &[],
        category: PersonCategory::PublicFigure,
        verified: false,
        faces: 1,
        gender: Gender::Male,
    },
];

/// Build the demo persons with fabricated faces for `provider`.
///
/// Each seeded person has completed training with an accuracy in [0.85, 0.98).
pub fn seed_persons(rng: &mut impl Rng, provider: &ProviderProfile) -> Vec<Person> {
    let now = Utc::now();
    SEED_PERSONS
        .iter()
        .map(|seed| {
            let slug = seed.name.to_lowercase().replace(' ', "-");
            let faces = (0..seed.faces)
                .map(|n| seed_face(&mut *rng, provider, &slug, n, seed.gender))
                .collect();

            Person {
                id: random_id(&mut *rng),
                name: seed.name.to_string(),
                aliases: seed.aliases.iter().map(|a| a.to_string()).collect(),
                faces,
                created_at: now,
                updated_at: now,
                verified: seed.verified,
                category: seed.category,
                training_status: TrainingStatus::Completed,
                accuracy: Some(rng.gen_range(0.85..0.98)),
            }
        })
        .collect()
}

fn seed_face(
    rng: &mut impl Rng,
    provider: &ProviderProfile,
    slug: &str,
    n: usize,
    gender: Gender,
) -> DetectedFace {
    let image_url = format!("{SEED_IMAGE_BASE}/{slug}-{n}.jpg");
    let coordinates = FaceCoordinates {
        x: 640.0,
        y: 320.0,
        width: 360.0,
        height: 420.0,
    };
    DetectedFace {
        id: random_id(rng),
        coordinates,
        confidence: rng.gen_range(provider.min_confidence..=provider.max_confidence),
        features: random_embedding(rng, provider.embedding_dim, &provider.name),
        cropped_face_url: Some(format!("{image_url}?crop=640,320,360,420")),
        image_url,
        quality: FaceQuality {
            overall: 0.9,
            sharpness: 0.92,
            brightness: 0.88,
            pose: 0.9,
        },
        attributes: FaceAttributes {
            age: Some(rng.gen_range(22..=45)),
            gender: Some(gender),
            emotion: Some(Emotion::Neutral),
            glasses: false,
            smile: rng.gen_range(0.0f32..0.6),
        },
    }
}
