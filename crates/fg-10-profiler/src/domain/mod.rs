pub mod profile;

pub use profile::{profile_prompt, relation_lines, Profile, ProfileDraft, ProfileError};
