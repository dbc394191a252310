// Shims Tests
//
// Tests for the shims module.

#[cfg(test)]
mod tests {
    use crate::ngtsc::shims::*;

    mod naming_tests {
        use super::*;

        #[test]
        fn should_map_origin_to_shim_and_back() {
            let shim = shim_file_for("/src/app/comp.ts").unwrap();
            assert_eq!(shim, "/src/app/comp.ngtypecheck.ts");
            assert!(is_shim(&shim));
            assert_eq!(origin_of_shim(&shim).as_deref(), Some("/src/app/comp.ts"));
        }

        #[test]
        fn should_not_shim_declarations_or_shims() {
            assert!(shim_file_for("/src/types.d.ts").is_none());
            assert!(shim_file_for("/src/app/comp.ngtypecheck.ts").is_none());
            assert!(shim_file_for("/src/styles.css").is_none());
            assert!(origin_of_shim("/src/app/comp.ts").is_none());
        }
    }

    mod generation_tests {
        use super::*;

        fn target(hash: &str, bindings: &[&str]) -> TypeCheckTarget {
            TypeCheckTarget {
                class_name: "AppComponent".to_string(),
                template_hash: hash.to_string(),
                bindings: bindings.iter().map(|b| b.to_string()).collect(),
            }
        }

        #[test]
        fn should_reference_every_binding() {
            let shim = generate_type_check_shim(
                "/src/app/app.component.ts",
                &[target("abc", &["title", "user.name"])],
            )
            .unwrap();
            assert_eq!(shim.file_name, "/src/app/app.component.ngtypecheck.ts");
            assert_eq!(shim.origin, "/src/app/app.component.ts");
            assert!(shim.content.contains("import * as i0 from \"./app.component\";"));
            assert!(shim.content.contains("function _tcb_AppComponent(ctx: i0.AppComponent)"));
            assert!(shim.content.contains("  ctx.title;\n"));
            assert!(shim.content.contains("  ctx.user.name;\n"));
        }

        #[test]
        fn should_change_when_template_changes() {
            let a = generate_type_check_shim("/src/c.ts", &[target("one", &["title"])]).unwrap();
            let b = generate_type_check_shim("/src/c.ts", &[target("two", &["title"])]).unwrap();
            let c = generate_type_check_shim("/src/c.ts", &[target("one", &["title"])]).unwrap();
            assert_ne!(a.content, b.content);
            assert_eq!(a.content, c.content);
        }
    }
}
