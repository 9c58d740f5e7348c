use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
};

use glob::Pattern;
use thiserror::Error;

const REFLECTANCE_TAG: &str = "_rfl_";

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("can't find reflectance or obs file in {}", .0.display())]
    MissingInput(PathBuf),
    #[error("`{}` has no `_rfl_` tag to substitute", .0.display())]
    MissingTag(PathBuf),
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
}

/// The two inputs of a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneFiles {
    pub reflectance: PathBuf,
    pub observation: PathBuf,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Correction {
    Brdf,
    Topographic,
}

impl Correction {
    fn tag(self) -> &'static str {
        match self {
            Correction::Brdf => "_brdf_",
            Correction::Topographic => "_topo_",
        }
    }

    /// Derives the output path by replacing the first `_rfl_` of the reflectance file name.
    ///
    /// The output lands in `output_dir` when one is given, next to the input otherwise.
    pub fn output_path(
        self,
        reflectance: &Path,
        output_dir: Option<&Path>,
    ) -> Result<PathBuf, SceneError> {
        let file_name = reflectance
            .file_name()
            .map(|name| name.to_string_lossy())
            .filter(|name| name.contains(REFLECTANCE_TAG))
            .ok_or_else(|| SceneError::MissingTag(reflectance.to_path_buf()))?;
        let file_name = file_name.replacen(REFLECTANCE_TAG, self.tag(), 1);

        let parent = match output_dir {
            Some(dir) => dir,
            None => reflectance.parent().unwrap_or_else(|| Path::new("")),
        };
        Ok(parent.join(file_name))
    }
}

impl Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correction::Brdf => f.write_str("BRDF"),
            Correction::Topographic => f.write_str("topographic"),
        }
    }
}

fn first_match(
    input_dir: &Path,
    suffix: &str,
    image_id: &str,
) -> Result<Option<PathBuf>, SceneError> {
    let dir = Pattern::escape(&input_dir.to_string_lossy());
    let pattern = Path::new(&dir).join(format!("{}{suffix}", Pattern::escape(image_id)));

    // `glob` yields paths in alphabetical order
    let path = glob::glob(&pattern.to_string_lossy())?.next().transpose()?;
    Ok(path)
}

/// Finds the reflectance and observation files of `image_id` in `input_dir`.
pub fn locate(input_dir: &Path, image_id: &str) -> Result<SceneFiles, SceneError> {
    let reflectance = first_match(input_dir, "*_rfl_*_img", image_id)?;
    let observation = first_match(input_dir, "*_rdn_obs_ort", image_id)?;

    match (reflectance, observation) {
        (Some(reflectance), Some(observation)) => {
            tracing::debug!(
                reflectance = %reflectance.display(),
                observation = %observation.display(),
                "located scene files"
            );
            Ok(SceneFiles {
                reflectance,
                observation,
            })
        }
        _ => Err(SceneError::MissingInput(input_dir.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs::File,
        path::{Path, PathBuf},
    };

    use tempfile::TempDir;

    use super::{locate, Correction, SceneError};

    const SCENE: &str = "ang20180601t183429";

    fn touch(dir: &TempDir, name: &str) {
        File::create(dir.path().join(name)).unwrap();
    }

    #[test]
    fn locates_first_match() {
        let dir = TempDir::new().unwrap();
        touch(&dir, &format!("{SCENE}_rfl_v2p9_img"));
        touch(&dir, &format!("{SCENE}_rfl_v2p9_img.hdr"));
        touch(&dir, &format!("{SCENE}_rfl_v1k1_img"));
        touch(&dir, &format!("{SCENE}_rdn_obs_ort"));
        touch(&dir, &format!("{SCENE}_rdn_obs_ort.hdr"));
        touch(&dir, "ang20180602t000000_rfl_v1k1_img");

        let files = locate(dir.path(), SCENE).unwrap();
        assert_eq!(
            files.reflectance,
            dir.path().join(format!("{SCENE}_rfl_v1k1_img"))
        );
        assert_eq!(
            files.observation,
            dir.path().join(format!("{SCENE}_rdn_obs_ort"))
        );
    }

    #[test]
    fn missing_observation() {
        let dir = TempDir::new().unwrap();
        touch(&dir, &format!("{SCENE}_rfl_v1k1_img"));

        let err = locate(dir.path(), SCENE).unwrap_err();
        assert!(matches!(err, SceneError::MissingInput(ref p) if p == dir.path()));
        assert!(err.to_string().starts_with("can't find reflectance or obs file in"));
    }

    #[test]
    fn missing_reflectance() {
        let dir = TempDir::new().unwrap();
        touch(&dir, &format!("{SCENE}_rdn_obs_ort"));
        touch(&dir, &format!("{SCENE}_rdn_img"));

        assert!(matches!(
            locate(dir.path(), SCENE),
            Err(SceneError::MissingInput(_))
        ));
    }

    #[test]
    fn metacharacters_are_literal() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "scene1_rfl_a_img");
        touch(&dir, "scene1_rdn_obs_ort");

        assert!(locate(dir.path(), "scene[0-9]").is_err());
        assert!(locate(dir.path(), "scene1").is_ok());
    }

    #[test]
    fn output_paths() {
        let input = Path::new("/data/ang_rfl_v1_rfl_img");

        assert_eq!(
            Correction::Brdf.output_path(input, None).unwrap(),
            PathBuf::from("/data/ang_brdf_v1_rfl_img")
        );
        assert_eq!(
            Correction::Topographic.output_path(input, None).unwrap(),
            PathBuf::from("/data/ang_topo_v1_rfl_img")
        );
        assert_eq!(
            Correction::Brdf
                .output_path(input, Some(Path::new("/out")))
                .unwrap(),
            PathBuf::from("/out/ang_brdf_v1_rfl_img")
        );
    }

    #[test]
    fn output_path_only_touches_file_name() {
        let input = Path::new("/runs_rfl_/ang_rfl_v1_img");

        assert_eq!(
            Correction::Topographic.output_path(input, None).unwrap(),
            PathBuf::from("/runs_rfl_/ang_topo_v1_img")
        );
        assert!(matches!(
            Correction::Brdf.output_path(Path::new("/data/ang_img"), None),
            Err(SceneError::MissingTag(_))
        ));
    }
}
