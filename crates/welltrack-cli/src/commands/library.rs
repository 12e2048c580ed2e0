use crate::cli::{LibraryArgs, LibraryCommands};
use crate::config::file::FileCalibration;
use crate::config::load_registry;
use crate::error::{CliError, Result};
use std::path::Path;
use tracing::info;
use welltrack::core::calibration::library::CalibrationRegistry;

const GRADATION_STEPS: u32 = 10;

pub fn run(args: LibraryArgs) -> Result<()> {
    let registry = load_registry(Path::new("."), &FileCalibration::default(), &args.calibration)?;
    for line in render(&registry, &args.command)? {
        println!("{}", line);
    }
    Ok(())
}

fn render(registry: &CalibrationRegistry, command: &LibraryCommands) -> Result<Vec<String>> {
    match command {
        LibraryCommands::Containers => {
            let names = registry.container_names();
            info!("{} calibrated container(s).", names.len());
            Ok(names.into_iter().map(str::to_string).collect())
        }
        LibraryCommands::Pipettes => {
            let names = registry.pipette_names();
            info!("{} pipette error profile(s).", names.len());
            Ok(names.into_iter().map(str::to_string).collect())
        }
        LibraryCommands::Show { name } => {
            let table = registry
                .container(name)
                .ok_or_else(|| CliError::Argument(format!("Unknown container '{}'.", name)))?;
            let depth = table.full_depth_headroom();

            let mut lines = vec![format!(
                "{}: {:.1} uL max, {:.2} mm deep",
                name,
                table.max_volume(),
                depth
            )];
            lines.extend((0..=GRADATION_STEPS).map(|i| {
                let headroom = depth * f64::from(i) / f64::from(GRADATION_STEPS);
                format!(
                    "  {:>8.2} mm  {:>10.1} uL",
                    headroom,
                    table.volume_given_headroom(headroom)
                )
            }));
            Ok(lines)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CalibrationRegistry {
        CalibrationRegistry::builtin().unwrap()
    }

    #[test]
    fn lists_builtin_names() {
        let pipettes = render(&registry(), &LibraryCommands::Pipettes).unwrap();
        assert_eq!(pipettes, vec!["p1000", "p300", "p50"]);

        let containers = render(&registry(), &LibraryCommands::Containers).unwrap();
        assert!(containers.contains(&"ftube-50ml".to_string()));
    }

    #[test]
    fn show_prints_a_header_and_every_gradation_step() {
        let lines = render(
            &registry(),
            &LibraryCommands::Show {
                name: "ftube-50ml".to_string(),
            },
        )
        .unwrap();
        assert_eq!(lines.len(), GRADATION_STEPS as usize + 2);
        assert!(lines[0].starts_with("ftube-50ml: 50000.0 uL max"));
    }

    #[test]
    fn show_rejects_unknown_containers() {
        let result = render(
            &registry(),
            &LibraryCommands::Show {
                name: "beaker".to_string(),
            },
        );
        assert!(matches!(result, Err(CliError::Argument(_))));
    }
}
