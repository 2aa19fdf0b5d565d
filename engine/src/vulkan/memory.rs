use anyhow::Result;
use vulkanalia::vk;

use crate::error::EngineError;

/// First memory type allowed by `type_bits` whose flags include `required`.
pub fn find_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..memory.memory_type_count)
        .find(|i| {
            let allowed = (type_bits & (1 << i)) != 0;
            let memory_type = memory.memory_types[*i as usize];
            allowed && memory_type.property_flags.contains(required)
        })
        .ok_or_else(|| {
            EngineError::NoSuitableMemoryType {
                type_bits,
                properties: required,
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = types.len() as u32;
        for (i, flags) in types.iter().enumerate() {
            properties.memory_types[i] = vk::MemoryType {
                property_flags: *flags,
                heap_index: 0,
            };
        }
        properties
    }

    fn typical() -> vk::PhysicalDeviceMemoryProperties {
        memory(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL
                | vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        ])
    }

    #[test]
    fn picks_first_superset_allowed_by_filter() {
        let staging =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert_eq!(find_memory_type(&typical(), 0b1111, staging).unwrap(), 2);
        // Type 2 filtered out; 3 is a superset.
        assert_eq!(find_memory_type(&typical(), 0b1011, staging).unwrap(), 3);
        assert_eq!(
            find_memory_type(&typical(), 0b1111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn every_selection_satisfies_filter_and_properties() {
        let memory = typical();
        let wanted = [
            vk::MemoryPropertyFlags::empty(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ];

        for type_bits in 0..16u32 {
            for required in wanted {
                match find_memory_type(&memory, type_bits, required) {
                    Ok(index) => {
                        assert_ne!(type_bits & (1 << index), 0);
                        assert!(memory.memory_types[index as usize]
                            .property_flags
                            .contains(required));
                    }
                    Err(_) => assert!((0..4).all(|i| type_bits & (1 << i) == 0
                        || !memory.memory_types[i].property_flags.contains(required))),
                }
            }
        }
    }

    #[test]
    fn no_match_reports_the_request() {
        let error = find_memory_type(&typical(), 0b0001, vk::MemoryPropertyFlags::HOST_VISIBLE)
            .unwrap_err();

        match error.downcast_ref::<EngineError>() {
            Some(EngineError::NoSuitableMemoryType {
                type_bits,
                properties,
            }) => {
                assert_eq!(*type_bits, 0b0001);
                assert_eq!(*properties, vk::MemoryPropertyFlags::HOST_VISIBLE);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
