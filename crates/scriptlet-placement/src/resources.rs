//! Instance resource derivation.

use std::collections::HashMap;

use scriptlet_core::config::VmDefaults;
use scriptlet_core::{InstanceResources, PlacementRequest};

use crate::error::{PlacementError, PlacementResult};
use crate::units::{parse_byte_size, parse_cpuset};

/// Work out what the requested instance will consume.
///
/// - CPU: `limits.cpu` as a core count, or the size of a pinned CPU set.
/// - Memory: `limits.memory` as a byte size.
/// - Root disk: `size` of the root disk device.
///
/// Virtual machines fall back to `defaults` for anything left unset;
/// containers fall back to zero.
pub fn instance_resources(
    request: &PlacementRequest,
    defaults: &VmDefaults,
) -> PlacementResult<InstanceResources> {
    let vm = request.is_vm();
    let mut resources = InstanceResources::default();

    if let Some(cpu) = request.config("limits.cpu") {
        resources.cpu_cores = match cpu.parse::<u64>() {
            Ok(cores) => cores,
            Err(_) => parse_cpuset(cpu).map_err(|e| parse_error("limits.cpu", e))?.len() as u64,
        };
    } else if vm {
        resources.cpu_cores = defaults.cpu_cores;
    }

    let memory = request
        .config("limits.memory")
        .or_else(|| vm.then_some(defaults.memory.as_str()));
    if let Some(memory) = memory {
        resources.memory_size =
            parse_byte_size(memory).map_err(|e| parse_error("limits.memory", e))?;
    }

    if let Some(root) = root_disk_device(&request.instance.put.devices) {
        let size = root
            .get("size")
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| vm.then_some(defaults.root_disk.as_str()));
        if let Some(size) = size {
            resources.root_disk_size =
                parse_byte_size(size).map_err(|e| parse_error("root disk size", e))?;
        }
    }

    Ok(resources)
}

/// The single disk device mounted at `/` without a `source`.
///
/// Returns `None` when there is no such device or more than one.
pub fn root_disk_device(
    devices: &HashMap<String, HashMap<String, String>>,
) -> Option<&HashMap<String, String>> {
    let mut roots = devices.values().filter(|device| {
        device.get("type").map(String::as_str) == Some("disk")
            && device.get("path").map(String::as_str) == Some("/")
            && device.get("source").is_none_or(|s| s.is_empty())
    });

    match (roots.next(), roots.next()) {
        (Some(root), None) => Some(root),
        _ => None,
    }
}

fn parse_error(field: &'static str, err: impl std::fmt::Display) -> PlacementError {
    PlacementError::Parse {
        field,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptlet_core::InstanceType;

    fn request(kind: InstanceType, config: &[(&str, &str)]) -> PlacementRequest {
        let mut req = PlacementRequest::default();
        req.instance.kind = kind;
        for (k, v) in config {
            req.instance
                .put
                .config
                .insert(k.to_string(), v.to_string());
        }
        req
    }

    fn with_root_disk(mut req: PlacementRequest, size: Option<&str>) -> PlacementRequest {
        let mut root = HashMap::from([
            ("type".to_string(), "disk".to_string()),
            ("path".to_string(), "/".to_string()),
            ("pool".to_string(), "default".to_string()),
        ]);
        if let Some(size) = size {
            root.insert("size".to_string(), size.to_string());
        }
        req.instance.put.devices.insert("root".to_string(), root);
        req
    }

    #[test]
    fn container_without_limits_is_all_zero() {
        let res = instance_resources(
            &request(InstanceType::Container, &[]),
            &VmDefaults::default(),
        )
        .unwrap();
        assert_eq!(res, InstanceResources::default());
    }

    #[test]
    fn vm_defaults_apply() {
        let req = with_root_disk(request(InstanceType::VirtualMachine, &[]), None);
        let res = instance_resources(&req, &VmDefaults::default()).unwrap();
        assert_eq!(
            res,
            InstanceResources {
                cpu_cores: 1,
                memory_size: 1 << 30,
                root_disk_size: 10 << 30,
            }
        );
    }

    #[test]
    fn explicit_limits() {
        let req = with_root_disk(
            request(
                InstanceType::Container,
                &[("limits.cpu", "4"), ("limits.memory", "512MiB")],
            ),
            Some("20GiB"),
        );
        let res = instance_resources(&req, &VmDefaults::default()).unwrap();
        assert_eq!(res.cpu_cores, 4);
        assert_eq!(res.memory_size, 512 << 20);
        assert_eq!(res.root_disk_size, 20 << 30);
    }

    #[test]
    fn pinned_cpus_are_counted() {
        let req = request(InstanceType::Container, &[("limits.cpu", "0-3,8")]);
        let res = instance_resources(&req, &VmDefaults::default()).unwrap();
        assert_eq!(res.cpu_cores, 5);
    }

    #[test]
    fn bad_limits_are_parse_errors() {
        let bad_cpu = request(InstanceType::Container, &[("limits.cpu", "lots")]);
        assert!(matches!(
            instance_resources(&bad_cpu, &VmDefaults::default()),
            Err(PlacementError::Parse { field: "limits.cpu", .. })
        ));

        let bad_memory = request(InstanceType::Container, &[("limits.memory", "50%")]);
        assert!(matches!(
            instance_resources(&bad_memory, &VmDefaults::default()),
            Err(PlacementError::Parse { field: "limits.memory", .. })
        ));

        let bad_disk = with_root_disk(request(InstanceType::Container, &[]), Some("big"));
        assert!(matches!(
            instance_resources(&bad_disk, &VmDefaults::default()),
            Err(PlacementError::Parse { field: "root disk size", .. })
        ));
    }

    #[test]
    fn root_disk_lookup() {
        let mut devices = HashMap::new();
        assert!(root_disk_device(&devices).is_none());

        devices.insert(
            "data".to_string(),
            HashMap::from([
                ("type".to_string(), "disk".to_string()),
                ("path".to_string(), "/data".to_string()),
            ]),
        );
        devices.insert(
            "host".to_string(),
            HashMap::from([
                ("type".to_string(), "disk".to_string()),
                ("path".to_string(), "/".to_string()),
                ("source".to_string(), "/srv".to_string()),
            ]),
        );
        assert!(root_disk_device(&devices).is_none());

        devices.insert(
            "root".to_string(),
            HashMap::from([
                ("type".to_string(), "disk".to_string()),
                ("path".to_string(), "/".to_string()),
            ]),
        );
        assert!(root_disk_device(&devices).is_some());

        // Two candidates are ambiguous.
        devices.insert(
            "root2".to_string(),
            HashMap::from([
                ("type".to_string(), "disk".to_string()),
                ("path".to_string(), "/".to_string()),
            ]),
        );
        assert!(root_disk_device(&devices).is_none());
    }
}
