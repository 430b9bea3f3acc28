//! Instruction templates sent alongside images to the generation model.
//!
//! Every template keeps the user's text verbatim and wraps it with a fixed set
//! of clauses. The clauses are exposed so callers and tests can check them.

/// Clauses appended to a free-text monument description.
pub const MONUMENT_FROM_TEXT_CLAUSES: &[&str] = &[
    "The monument must be a three-dimensional, solid physical object.",
    "It must stand on a plinth or base.",
    "Render it new and unweathered, lit like a studio product photograph.",
    "Place it on a plain, neutral, flat background so it can be composited later.",
];

/// Clauses wrapped around the style text when building from an uploaded image.
pub const MONUMENT_FROM_IMAGE_CLAUSES: &[&str] = &[
    "Isolate the main subject of the provided image.",
    "Discard the original background entirely.",
    "Render the subject as a monument standing on a base.",
    "Place it on a plain, neutral, flat background so it can be composited later.",
];

/// Clauses wrapped around a placement instruction for the composite call.
pub const SCENE_COMPOSITE_CLAUSES: &[&str] = &[
    "Analyse the lighting, perspective and camera angle of the scene.",
    "Scale and position the monument so it sits plausibly in the scene.",
    "Match the direction and softness of the scene's shadows.",
    "Preserve the original framing and aspect ratio of the scene image.",
];

const DESCRIBE_SCENE_INSTRUCTION: &str = "Describe the environment in this image in one short \
line, for example \"a sunny city park with a fountain\". Reply with the description only.";

/// Builds the instruction for generating a monument from a text description.
pub fn monument_from_text(description: &str) -> String {
    let mut prompt = format!(
        "Create a photorealistic image of a monument: {}.",
        description.trim()
    );
    push_clauses(&mut prompt, MONUMENT_FROM_TEXT_CLAUSES);
    prompt
}

/// Builds the instruction for turning an uploaded image into a monument.
pub fn monument_from_image(style: &str) -> String {
    let mut prompt = String::from(
        "Turn the subject of the provided image into a monument in the following style: ",
    );
    prompt.push_str(style.trim());
    prompt.push('.');
    push_clauses(&mut prompt, MONUMENT_FROM_IMAGE_CLAUSES);
    prompt
}

/// Builds the composite instruction. The first image is the scene, the second
/// the monument.
pub fn scene_composite(instruction: &str) -> String {
    let mut prompt = format!(
        "The first image is a scene and the second image is a monument. Instruction: {}",
        instruction.trim()
    );
    push_clauses(&mut prompt, SCENE_COMPOSITE_CLAUSES);
    prompt.push_str(" Return only the edited scene image.");
    prompt
}

/// Builds the instruction for generating a scene from a prompt.
pub fn scene_from_text(prompt: &str) -> String {
    format!(
        "Create a realistic photograph of the following scene: {}. Leave open space where a \
         monument could stand.",
        prompt.trim()
    )
}

/// The fixed instruction for describing an uploaded scene.
pub fn describe_scene() -> &'static str {
    DESCRIBE_SCENE_INSTRUCTION
}

/// Seeds the placement instruction from an automatic scene description.
pub fn placement_from_description(description: &str) -> String {
    let description = description.trim().trim_end_matches('.');
    format!("Place the monument in {description}, making it look natural")
}

fn push_clauses(prompt: &mut String, clauses: &[&str]) {
    prompt.push_str(" Requirements:");
    for clause in clauses {
        prompt.push(' ');
        prompt.push_str(clause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_template_keeps_description_and_clauses() {
        let prompt = monument_from_text("a lion with a crown");
        assert!(prompt.contains("a lion with a crown"));
        for clause in MONUMENT_FROM_TEXT_CLAUSES {
            assert!(prompt.contains(clause), "missing clause {clause}");
        }
    }

    #[test]
    fn image_template_keeps_style_and_clauses() {
        let prompt = monument_from_image("weathered marble, art deco");
        assert!(prompt.contains("weathered marble, art deco"));
        for clause in MONUMENT_FROM_IMAGE_CLAUSES {
            assert!(prompt.contains(clause), "missing clause {clause}");
        }
    }

    #[test]
    fn composite_template_keeps_instruction_and_clauses() {
        let prompt = scene_composite("Put it next to the fountain");
        assert!(prompt.contains("Put it next to the fountain"));
        for clause in SCENE_COMPOSITE_CLAUSES {
            assert!(prompt.contains(clause), "missing clause {clause}");
        }
    }

    #[test]
    fn placement_seed_uses_description() {
        assert_eq!(
            placement_from_description("a snowy mountain pass."),
            "Place the monument in a snowy mountain pass, making it look natural"
        );
    }

    #[test]
    fn scene_template_keeps_prompt() {
        assert!(scene_from_text(" a park ").contains("scene: a park."));
        assert!(describe_scene().contains("one short"));
    }
}
