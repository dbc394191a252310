// Core Tests
//
// Tests for component extraction, template scanning, resource rewrites and
// the component analysis of NgCompiler.

#[cfg(test)]
mod tests {
    use crate::ngtsc::core::*;
    use crate::ngtsc::diagnostics::{ng_error_code, ErrorCode};

    const APP_COMPONENT: &str = "import { Component } from '@angular/core';

@Component({
  selector: 'app-root',
  templateUrl: './app.component.html',
  styleUrls: ['./app.component.css'],
})
export class AppComponent {
  title = 'app';
  constructor(private service: Service) {}
  onClick() {}
}
";

    mod component_tests {
        use super::*;

        #[test]
        fn should_extract_external_resources() {
            let components = extract_components("/src/app/app.component.ts", APP_COMPONENT);
            assert_eq!(components.len(), 1);
            let component = &components[0];
            assert_eq!(component.class_name, "AppComponent");
            assert!(component.problems.is_empty());
            assert_eq!(
                component.external_resources().collect::<Vec<_>>(),
                vec!["./app.component.html", "./app.component.css"]
            );

            let Some(ResourceDecl::External { span, .. }) = &component.template else {
                panic!("expected an external template");
            };
            assert_eq!(&APP_COMPONENT[span.start..span.end], "'./app.component.html'");
            assert_eq!(component.style_properties.len(), 1);
        }

        #[test]
        fn should_collect_members_visible_to_the_template() {
            let components = extract_components("/src/app/app.component.ts", APP_COMPONENT);
            let members: Vec<&str> = components[0].members.iter().map(String::as_str).collect();
            assert_eq!(members, vec!["onClick", "service", "title"]);
        }

        #[test]
        fn should_flag_missing_template() {
            let text = "@Component({ selector: 'x' })\nexport class EmptyComponent {}\n";
            let components = extract_components("/src/empty.ts", text);
            assert!(components[0].is_missing_template());
        }

        #[test]
        fn should_report_wrong_arity_without_missing_template() {
            let text = "@Component()\nexport class BrokenComponent {}\n";
            let component = &extract_components("/src/broken.ts", text)[0];
            assert_eq!(component.problems[0].code, ErrorCode::DecoratorArityWrong);
            assert!(!component.is_missing_template());
        }

        #[test]
        fn should_reject_style_url_together_with_style_urls() {
            let text = "@Component({\n  template: '',\n  styleUrl: './a.css',\n  styleUrls: ['./b.css'],\n})\nclass TwiceComponent {}\n";
            let component = &extract_components("/src/twice.ts", text)[0];
            assert!(component
                .problems
                .iter()
                .any(|problem| problem.code == ErrorCode::ComponentInvalidStyleUrls));
        }

        #[test]
        fn should_skip_files_without_components() {
            assert!(!may_contain_components("export const a = 1;"));
            assert!(extract_components("/src/a.ts", "export class Plain {}").is_empty());
        }
    }

    mod template_tests {
        use super::*;

        #[test]
        fn should_read_interpolations_and_skip_pipes() {
            let parsed = parse_template("<h1>{{ title }}</h1><p>{{ user?.name | uppercase }}</p>");
            assert_eq!(parsed.binding_paths(), vec!["title", "user.name"]);
            assert!(parsed.errors.is_empty());
        }

        #[test]
        fn should_declare_structural_directive_locals() {
            let parsed = parse_template(
                "<li *ngFor=\"let item of items; let i = index\">{{ i }}: {{ item.label }}</li>",
            );
            assert_eq!(parsed.binding_paths(), vec!["items"]);
            assert!(parsed.locals.contains("item"));
            assert!(parsed.locals.contains("i"));
        }

        #[test]
        fn should_read_control_flow_blocks() {
            let parsed = parse_template(
                "@for (item of items; track item.id) { {{ item.name }} }\n@if (user; as u) { {{ u.name }} }",
            );
            assert_eq!(parsed.binding_paths(), vec!["items", "user"]);
        }

        #[test]
        fn should_treat_template_references_as_locals() {
            let parsed = parse_template("<input #box (keyup)=\"onKey(box.value)\">");
            assert_eq!(parsed.binding_paths(), vec!["onKey"]);
        }

        #[test]
        fn should_not_declare_locals_in_event_assignments() {
            let parsed = parse_template("<button (click)=\"count = count + 1\">+</button>");
            assert_eq!(parsed.binding_paths(), vec!["count"]);
            assert!(parsed.locals.is_empty());
        }

        #[test]
        fn should_ignore_string_literal_contents() {
            let parsed = parse_template("{{ 'hello there' + name }}");
            assert_eq!(parsed.binding_paths(), vec!["name"]);
        }

        #[test]
        fn should_report_unterminated_interpolation() {
            let parsed = parse_template("<p>{{ title </p>");
            assert_eq!(parsed.errors.len(), 1);
            assert_eq!(parsed.errors[0].start, 3);
            assert!(parsed.errors[0].message.starts_with("Unterminated interpolation"));
        }

        #[test]
        fn should_record_binding_offsets() {
            let template = "<p>{{ first }}</p>\n<p>{{ second }}</p>";
            let parsed = parse_template(template);
            let second = &parsed.bindings[1];
            assert_eq!(second.root, "second");
            assert_eq!(second.start, template.find("second").unwrap());
        }
    }

    mod transform_tests {
        use super::*;

        #[test]
        fn should_inline_compiled_resources() {
            let components = extract_components("/src/app/app.component.ts", APP_COMPONENT);
            let styles = vec![Some("h1 { color: red; }".to_string())];
            let output = inline_resources(
                APP_COMPONENT,
                &[(
                    &components[0],
                    InlineResources {
                        template: Some("<h1>{{ title }}</h1>"),
                        styles: &styles,
                    },
                )],
            )
            .unwrap();
            assert!(output.contains("template: \"<h1>{{ title }}</h1>\""));
            assert!(output.contains("styles: [\"h1 { color: red; }\"]"));
            assert!(!output.contains("templateUrl"));
            assert!(!output.contains("styleUrls"));
        }

        #[test]
        fn should_merge_style_properties_into_one() {
            let text = "@Component({\n  template: '<p></p>',\n  styleUrl: './a.css',\n  styles: ['p {}'],\n})\nexport class MixedComponent {}\n";
            let components = extract_components("/src/mixed.ts", text);
            let styles = vec![Some("a {}".to_string()), Some("p {}".to_string())];
            let output = inline_resources(
                text,
                &[(
                    &components[0],
                    InlineResources {
                        template: None,
                        styles: &styles,
                    },
                )],
            )
            .unwrap();
            assert_eq!(output.matches("styles:").count(), 1);
            assert!(output.contains("styles: [\"a {}\", \"p {}\"]"));
            assert!(!output.contains("styleUrl"));
            assert!(output.contains("template: '<p></p>'"));
        }

        #[test]
        fn should_keep_styles_that_failed_to_compile() {
            let components = extract_components("/src/app/app.component.ts", APP_COMPONENT);
            let styles = vec![None];
            let output = inline_resources(
                APP_COMPONENT,
                &[(
                    &components[0],
                    InlineResources {
                        template: None,
                        styles: &styles,
                    },
                )],
            );
            assert!(output.is_none());
        }

        #[test]
        fn should_replace_resources_with_imports() {
            let components = extract_components("/src/app/app.component.ts", APP_COMPONENT);
            let output =
                replace_resources_with_imports(APP_COMPONENT, "/src/app/app.component.ts", &components)
                    .unwrap();
            assert!(output.starts_with(
                "import __NG_CLI_RESOURCE__0 from \"angular:jit:template:file;./app.component.html\";\n\
                 import __NG_CLI_RESOURCE__1 from \"angular:jit:style:file;./app.component.css\";\n"
            ));
            assert!(output.contains("template: __NG_CLI_RESOURCE__0"));
            assert!(output.contains("styles: [__NG_CLI_RESOURCE__1]"));
        }

        #[test]
        fn should_leave_inline_templates_alone() {
            let text = "@Component({ template: '<p></p>' })\nexport class InlineComponent {}\n";
            let components = extract_components("/src/inline.ts", text);
            assert!(replace_resources_with_imports(text, "/src/inline.ts", &components).is_none());
        }
    }

    mod compiler_tests {
        use super::*;
        use crate::ngtsc::file_system::testing::MockFileSystem;
        use crate::ngtsc::file_system::FileSystem;
        use crate::ngtsc::resource::{FileResourceBundler, ResourceLoader};
        use crate::transformers::api::ResourceHost;
        use std::sync::Arc;
        use ts::{dirname, join_paths, SourceFile};

        struct FsResourceHost(MockFileSystem);

        impl ResourceHost for FsResourceHost {
            fn resource_name_to_file_name(&self, name: &str, containing_file: &str) -> Option<String> {
                let path = join_paths(dirname(containing_file), name);
                self.0.is_file(&path).then_some(path)
            }
        }

        const COMPONENT_FILE: &str = "/src/app/app.component.ts";
        const TEMPLATE_FILE: &str = "/src/app/app.component.html";

        fn setup(template: &str) -> (MockFileSystem, FsResourceHost, ResourceLoader) {
            let fs = MockFileSystem::new();
            fs.init_with_files(vec![
                (COMPONENT_FILE, APP_COMPONENT),
                (TEMPLATE_FILE, template),
                ("/src/app/app.component.css", "h1 { color: red; }"),
            ]);
            let loader = ResourceLoader::new(Arc::new(FileResourceBundler::new(Arc::new(fs.clone()))));
            (fs.clone(), FsResourceHost(fs), loader)
        }

        fn source(fs: &MockFileSystem, name: &str) -> Arc<SourceFile> {
            Arc::new(SourceFile::parse(name, fs.get(name).unwrap()))
        }

        #[test]
        fn should_report_unknown_members_in_external_templates() {
            let template = "<h1>{{ title }}</h1>\n<p>{{ missing }}</p>\n";
            let (fs, host, mut loader) = setup(template);
            let mut compiler = NgCompiler::new(NgCompilerOptions::default());
            compiler
                .analyze(&[source(&fs, COMPONENT_FILE)], &host, &mut loader)
                .unwrap();

            let diagnostics = compiler.template_diagnostics(COMPONENT_FILE);
            assert_eq!(diagnostics.len(), 1);
            let diagnostic = &diagnostics[0];
            assert_eq!(diagnostic.code, PROPERTY_DOES_NOT_EXIST_CODE);
            assert_eq!(diagnostic.file.as_deref(), Some(TEMPLATE_FILE));
            assert_eq!(diagnostic.start, template.find("missing"));
            assert_eq!(
                diagnostic.message_text.to_string(),
                "Property 'missing' does not exist on type 'AppComponent'."
            );
            let note = &diagnostic.related_information.as_ref().unwrap()[0];
            assert_eq!(note.file.as_deref(), Some(COMPONENT_FILE));
            assert_eq!(note.message_text, "Error occurs in the template of component AppComponent.");
        }

        #[test]
        fn should_generate_type_check_shims() {
            let (fs, host, mut loader) = setup("<h1>{{ title }}</h1>");
            let mut compiler = NgCompiler::new(NgCompilerOptions::default());
            compiler
                .analyze(&[source(&fs, COMPONENT_FILE)], &host, &mut loader)
                .unwrap();

            let shims: Vec<_> = compiler.shims().collect();
            assert_eq!(shims.len(), 1);
            assert_eq!(shims[0].file_name, "/src/app/app.component.ngtypecheck.ts");
            assert!(shims[0].content.contains("ctx.title;"));
            assert!(compiler.template_diagnostics(COMPONENT_FILE).is_empty());
        }

        #[test]
        fn should_report_missing_resources() {
            let (fs, host, mut loader) = setup("<h1>{{ title }}</h1>");
            fs.remove(TEMPLATE_FILE);
            let mut compiler = NgCompiler::new(NgCompilerOptions::default());
            compiler
                .analyze(&[source(&fs, COMPONENT_FILE)], &host, &mut loader)
                .unwrap();

            let diagnostics = compiler.template_diagnostics(COMPONENT_FILE);
            assert_eq!(diagnostics.len(), 1);
            assert_eq!(diagnostics[0].code, ng_error_code(ErrorCode::ComponentResourceNotFound));
            assert_eq!(
                diagnostics[0].message_text.to_string(),
                "Could not find template file './app.component.html'."
            );
            assert!(!compiler.resource_files().contains(TEMPLATE_FILE));
            assert!(compiler.shims().next().is_none());
        }

        #[test]
        fn should_report_stylesheet_compilation_failures() {
            let (fs, host, mut loader) = setup("<h1>{{ title }}</h1>");
            fs.set("/src/app/app.component.css", "@import './missing.css';\nh1 {}");
            let mut compiler = NgCompiler::new(NgCompilerOptions::default());
            compiler
                .analyze(&[source(&fs, COMPONENT_FILE)], &host, &mut loader)
                .unwrap();

            let diagnostics = compiler.template_diagnostics(COMPONENT_FILE);
            assert_eq!(diagnostics.len(), 1);
            assert_eq!(
                diagnostics[0].code,
                ng_error_code(ErrorCode::ComponentResourceCompilationFailed)
            );
            assert!(compiler.resource_files().contains("/src/app/missing.css"));
        }

        #[test]
        fn should_map_inline_template_errors_into_the_component() {
            let text = "@Component({ template: '<p>{{ nope }}</p>' })\nexport class InlineComponent {}\n";
            let fs = MockFileSystem::new();
            fs.set("/src/inline.ts", text);
            let host = FsResourceHost(fs.clone());
            let mut loader = ResourceLoader::new(Arc::new(FileResourceBundler::new(Arc::new(fs.clone()))));
            let mut compiler = NgCompiler::new(NgCompilerOptions::default());
            compiler
                .analyze(&[source(&fs, "/src/inline.ts")], &host, &mut loader)
                .unwrap();

            let diagnostics = compiler.template_diagnostics("/src/inline.ts");
            assert_eq!(diagnostics.len(), 1);
            assert_eq!(diagnostics[0].file.as_deref(), Some("/src/inline.ts"));
            assert_eq!(diagnostics[0].start, text.find("nope"));
            assert!(diagnostics[0].related_information.is_none());
        }

        #[test]
        fn should_map_positions_past_escape_sequences_in_inline_templates() {
            let text = "@Component({ template: '\\n\\n<b class=\\'x\\'>\\u00e9é{{ missing }}</b> {{ open' })\nexport class EscapedComponent {}\n";
            let fs = MockFileSystem::new();
            fs.set("/src/escaped.ts", text);
            let host = FsResourceHost(fs.clone());
            let mut loader = ResourceLoader::new(Arc::new(FileResourceBundler::new(Arc::new(fs.clone()))));
            let mut compiler = NgCompiler::new(NgCompilerOptions::default());
            compiler
                .analyze(&[source(&fs, "/src/escaped.ts")], &host, &mut loader)
                .unwrap();

            let diagnostics = compiler.template_diagnostics("/src/escaped.ts");
            let unknown = diagnostics
                .iter()
                .find(|d| d.code == PROPERTY_DOES_NOT_EXIST_CODE)
                .unwrap();
            assert_eq!(unknown.start, text.find("missing"));
            assert_eq!(unknown.length, Some("missing".len()));

            let unterminated = diagnostics
                .iter()
                .find(|d| d.code == ng_error_code(ErrorCode::TemplateParseError))
                .unwrap();
            let start = unterminated.start.unwrap();
            assert_eq!(start, text.find("{{ open").unwrap());
            assert!(text.is_char_boundary(start + unterminated.length.unwrap()));
        }

        #[test]
        fn should_skip_member_checks_when_type_checking_is_off() {
            let (fs, host, mut loader) = setup("<p>{{ missing }}</p>");
            let options = NgCompilerOptions {
                full_template_type_check: Some(false),
                ..Default::default()
            };
            let mut compiler = NgCompiler::new(options);
            compiler
                .analyze(&[source(&fs, COMPONENT_FILE)], &host, &mut loader)
                .unwrap();
            assert!(compiler.template_diagnostics(COMPONENT_FILE).is_empty());
            assert!(compiler.options_diagnostics().is_empty());
        }

        #[test]
        fn should_reject_strict_templates_without_full_type_check() {
            let compiler = NgCompiler::new(NgCompilerOptions {
                strict_templates: Some(true),
                full_template_type_check: Some(false),
                ..Default::default()
            });
            let diagnostics = compiler.options_diagnostics();
            assert_eq!(diagnostics.len(), 1);
            assert_eq!(
                diagnostics[0].code,
                ng_error_code(ErrorCode::ConfigStrictTemplatesImpliesFullTemplateTypecheck)
            );
        }

        #[test]
        fn should_reanalyze_when_a_template_changes() {
            let (fs, host, mut loader) = setup("<h1>{{ title }}</h1>");
            let mut compiler = NgCompiler::new(NgCompilerOptions::default());
            let component = source(&fs, COMPONENT_FILE);
            compiler.analyze(&[component.clone()], &host, &mut loader).unwrap();
            let first_shim = compiler.shims().next().unwrap().content.clone();
            let first_hashes = compiler.resource_hashes(COMPONENT_FILE).to_vec();

            compiler.analyze(&[component.clone()], &host, &mut loader).unwrap();
            assert_eq!(compiler.resource_hashes(COMPONENT_FILE), first_hashes.as_slice());

            fs.set(TEMPLATE_FILE, "<h1>{{ title }}!</h1>");
            loader.invalidate([TEMPLATE_FILE]);
            compiler.analyze(&[component], &host, &mut loader).unwrap();
            assert_ne!(compiler.resource_hashes(COMPONENT_FILE), first_hashes.as_slice());
            assert_ne!(compiler.shims().next().unwrap().content, first_shim);
        }

        #[test]
        fn should_release_resources_of_removed_files() {
            let (fs, host, mut loader) = setup("<h1>{{ title }}</h1>");
            let mut compiler = NgCompiler::new(NgCompilerOptions::default());
            compiler
                .analyze(&[source(&fs, COMPONENT_FILE)], &host, &mut loader)
                .unwrap();
            assert_eq!(loader.len(), 2);

            compiler.analyze(&[], &host, &mut loader).unwrap();
            assert!(compiler.analysis(COMPONENT_FILE).is_none());
            assert!(loader.is_empty());
        }

        #[test]
        fn should_keep_one_entry_per_edited_inline_style() {
            let fs = MockFileSystem::new();
            let host = FsResourceHost(fs.clone());
            let mut loader = ResourceLoader::new(Arc::new(FileResourceBundler::new(Arc::new(fs.clone()))));
            let mut compiler = NgCompiler::new(NgCompilerOptions::default());

            for n in 0..5 {
                fs.set(
                    "/src/styled.ts",
                    &format!(
                        "@Component({{ template: '<p></p>', styles: ['p {{ color: c{}; }}'] }})\nexport class StyledComponent {{}}\n",
                        n
                    ),
                );
                compiler
                    .analyze(&[source(&fs, "/src/styled.ts")], &host, &mut loader)
                    .unwrap();
                assert_eq!(loader.len(), 1);
            }
            let styles = &compiler.analysis("/src/styled.ts").unwrap().components[0].styles;
            assert_eq!(styles[0].as_deref(), Some("p { color: c4; }"));
        }

        #[test]
        fn should_release_a_template_file_replaced_by_an_inline_template() {
            let (fs, host, mut loader) = setup("<h1>{{ title }}</h1>");
            let mut compiler = NgCompiler::new(NgCompilerOptions::default());
            compiler
                .analyze(&[source(&fs, COMPONENT_FILE)], &host, &mut loader)
                .unwrap();
            assert!(loader.contains(TEMPLATE_FILE));

            fs.set(
                COMPONENT_FILE,
                &APP_COMPONENT.replace("templateUrl: './app.component.html'", "template: '<h1>{{ title }}</h1>'"),
            );
            compiler
                .analyze(&[source(&fs, COMPONENT_FILE)], &host, &mut loader)
                .unwrap();
            assert!(!loader.contains(TEMPLATE_FILE));
            assert!(!compiler.resource_files().contains(TEMPLATE_FILE));
            assert!(loader.contains("/src/app/app.component.css"));
        }

        #[test]
        fn should_inline_resources_for_emit() {
            let (fs, host, mut loader) = setup("<h1>{{ title }}</h1>");
            let mut compiler = NgCompiler::new(NgCompilerOptions::default());
            compiler
                .analyze(&[source(&fs, COMPONENT_FILE)], &host, &mut loader)
                .unwrap();
            let output = compiler
                .inline_resources_for_emit(COMPONENT_FILE, APP_COMPONENT)
                .unwrap();
            assert!(output.contains("template: \"<h1>{{ title }}</h1>\""));
            assert!(output.contains("styles: [\"h1 { color: red; }\"]"));
        }
    }
}
