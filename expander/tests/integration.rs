use codestream::{CodeStream, StreamConfig};
use expander::{
    ChannelRef, DataType, Direction, ExpandError, GenerationContext, MacroRegistry,
    ModelComponent, Parameter, Target, TemplateParser, UserMacro,
};

fn ramp() -> ModelComponent {
    ModelComponent::new("Ramp", "ptolemy.actor.lib.Ramp")
        .with_container(".model")
        .with_port("trigger", Direction::Input, DataType::Int)
        .with_multiport("input", Direction::Input, DataType::Double, 3)
        .with_port("output", Direction::Output, DataType::Double)
        .with_port(
            "values",
            Direction::Input,
            DataType::Array(Box::new(DataType::Int), None),
        )
        .with_port(
            "point",
            Direction::Input,
            DataType::Record(vec![
                ("x".to_string(), DataType::Double),
                ("y".to_string(), DataType::Double),
            ]),
        )
        .with_parameter(Parameter::new("init", DataType::Int, "0"))
        .with_parameter(Parameter::new("step", DataType::Double, "1.5").modifiable())
        .with_parameter(Parameter::string("label", "say \"hi\""))
        .with_parameter(Parameter::new(
            "weights",
            DataType::Array(Box::new(DataType::Double), Some(3)),
            "{0.5, 1.0, 2.0}",
        ))
        .with_scoped(Parameter::new("rate", DataType::Double, "44100.0"))
}

fn expand_with(code: &str, context: &mut GenerationContext) -> Result<String, ExpandError> {
    let component = ramp();
    let mut parser = TemplateParser::new(&component, &Target::C, context);
    parser.process_code(code)
}

fn expand(code: &str) -> String {
    expand_with(code, &mut GenerationContext::new()).expect("expansion failed")
}

fn expand_err(code: &str) -> ExpandError {
    match expand_with(code, &mut GenerationContext::new()) {
        Ok(out) => panic!("expected an error, got {out:?}"),
        Err(err) => innermost(err),
    }
}

/// The error beneath any macro-failure wrappers.
fn innermost(err: ExpandError) -> ExpandError {
    match err {
        ExpandError::MacroFailed { source, .. } => innermost(*source),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

#[test]
fn plain_code_is_unchanged() {
    assert_eq!(expand("int x = 1;"), "int x = 1;");
    assert_eq!(expand(""), "");
}

#[test]
fn expanded_code_expands_to_itself() {
    let inputs = [
        "if ($hasToken(input#1)) {\n    $put(output, $get(input#1) * $val(step));\n}\n",
        "$put(output, 2, ${rate} + $val(init));",
        "double $actorSymbol(state) = $val(weights, 1);",
        "keep $$nation and $5 as they are",
    ];
    for input in inputs {
        let once = expand(input);
        assert_eq!(expand(&once), once, "re-expanding {input:?}");
    }
}

#[test]
fn dollar_forms_that_are_not_macros() {
    assert_eq!(expand("a $$b"), "a $$b");
    assert_eq!(expand("\\$get(trigger)"), "\\$get(trigger)");
    assert_eq!(expand("cost: $5 or $ alone"), "cost: $5 or $ alone");
    assert_eq!(expand("$name without call"), "$name without call");
}

#[test]
fn arguments_expand_before_the_macro() {
    assert_eq!(expand("$actorSymbol($actorName())"), "_model_Ramp_Ramp");
}

#[test]
fn dollar_inside_macro_name() {
    assert_eq!(expand("$abc$actorSymbol(x)"), "$abc_model_Ramp_x");
}

#[test]
fn unbalanced_paren() {
    let err = expand_err("$get(trigger");
    assert!(matches!(err, ExpandError::UnbalancedParen { ref macro_name, .. } if macro_name == "get"));
}

#[test]
fn failures_carry_the_macro_and_code() {
    let err = expand_with("x = $get(nowhere);", &mut GenerationContext::new()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("\"nowhere\""));
    assert!(message.contains("\"get\""));
    assert!(message.contains("x = $get(nowhere);"));
    assert!(matches!(innermost(err), ExpandError::PortNotFound(port) if port == "nowhere"));
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

#[test]
fn variables_and_constants() {
    assert_eq!(expand("${rate} Hz"), "44100.0 Hz");
    assert_eq!(expand("${ init }"), "0");
    assert_eq!(expand("${MaxInt}"), "2147483647");
}

#[test]
fn missing_variable() {
    assert!(matches!(
        expand_err("${nope}"),
        ExpandError::VariableNotFound { name, .. } if name == "nope"
    ));
    assert!(matches!(expand_err("${rate"), ExpandError::UnterminatedBrace { .. }));
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

#[test]
fn get_from_ports() {
    assert_eq!(expand("$get(trigger)"), "_model_Ramp_trigger");
    assert_eq!(expand("$get(input#2)"), "_model_Ramp_input[2]");
    assert_eq!(expand("$get(input#1, 3)"), "_model_Ramp_input[1][3]");
}

#[test]
fn get_with_and_without_payload() {
    assert_eq!(expand("$get(values)"), "_model_Ramp_values.payload.Array");
    assert_eq!(expand("$getNoPayload(values)"), "_model_Ramp_values");
}

#[test]
fn get_rejects_bad_arguments() {
    assert!(matches!(expand_err("$get(a, b, c)"), ExpandError::BadArguments { macro_name: "get", .. }));
    assert!(matches!(expand_err("$get(input#)"), ExpandError::BadArguments { .. }));
    match expand_err("$get(output)") {
        ExpandError::Model(e) => assert!(e.to_string().contains("Cannot read from output port")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn put_to_ports() {
    assert_eq!(expand("$put(output, $val(init))"), "_model_Ramp_output = 0");
    assert_eq!(expand("$put(output, 2, x + 1)"), "_model_Ramp_output[2] = x + 1");
    assert_eq!(expand("$putLocalInside(trigger, 1)"), "_model_Ramp_trigger_inside = 1");
    assert!(matches!(expand_err("$put(trigger, 1)"), ExpandError::Model(_)));
    assert!(matches!(expand_err("$put(output)"), ExpandError::BadArguments { .. }));
}

#[test]
fn has_token() {
    assert_eq!(expand("$hasToken(input#1)"), "_model_Ramp_input_isPresent[1]");
    assert_eq!(expand("$hasToken(trigger)"), "_model_Ramp_trigger_isPresent");
}

#[test]
fn ref_is_rejected() {
    assert!(matches!(expand_err("$ref(output)"), ExpandError::RefUnsupported));
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[test]
fn param_inlines_constants_and_references_modifiables() {
    assert_eq!(expand("$param(init)"), "0");
    assert_eq!(expand("$param(step)"), "_model_Ramp_step");
    assert_eq!(expand("$param(step, 2)"), "_model_Ramp_step[2]");
    assert!(matches!(expand_err("$param(rate)"), ExpandError::AttributeNotFound(_)));
}

#[test]
fn val_of_strings_and_arrays() {
    assert_eq!(expand("$val(label)"), r#""say \"hi\"""#);
    assert_eq!(expand("$val(weights, 1)"), "1.0");
    assert_eq!(expand("$val(rate)"), "44100.0");
    assert!(matches!(expand_err("$val(init, 0)"), ExpandError::NotAnArray(_)));
    assert!(matches!(expand_err("$val(weights, 7)"), ExpandError::NotAnArray(_)));
}

#[test]
fn val_with_cast_converts() {
    let mut context = GenerationContext::new();
    assert_eq!(
        expand_with("$val((Int)rate)", &mut context).unwrap(),
        "DoubletoInt(44100.0)"
    );
    assert!(context.functions_used.contains("DoubletoInt"));
    assert_eq!(expand("$val((Double)rate)"), "44100.0");
}

#[test]
fn convert_between_types() {
    assert_eq!(expand("$convert_Int_Double(x)"), "InttoDouble(x)");
    assert_eq!(expand("$convert_Int_Int(x)"), "x");
}

#[test]
fn size_of_parameters_and_ports() {
    assert_eq!(expand("$size(weights)"), "3");
    assert_eq!(expand("$size(init)"), "1");
    assert_eq!(expand("$size(input)"), "3");
    assert_eq!(expand("$size(trigger)"), "1");
    assert_eq!(expand("$size(values)"), "_model_Ramp_values.payload.Array->size");
}

// ---------------------------------------------------------------------------
// Types and names
// ---------------------------------------------------------------------------

#[test]
fn type_macros() {
    assert_eq!(expand("$type(output)"), "TYPE_Double");
    assert_eq!(expand("$cgType(init)"), "Int");
    assert_eq!(expand("$targetType(label)"), "char*");
    assert_eq!(expand("$type(point)"), "Record");
    assert!(matches!(expand_err("$type(nothing)"), ExpandError::NotTyped(_)));
}

#[test]
fn name_macros() {
    assert_eq!(expand("$actorSymbol(state)"), "_model_Ramp_state");
    assert_eq!(expand("$actorSymbol()"), "_model_Ramp");
    assert_eq!(expand("$containerSymbol()"), "_model");
    assert_eq!(expand("$actorName()"), "Ramp");
    assert_eq!(expand("$actorClass(fire)"), "ptolemy_actor_lib_Ramp_fire");
}

// ---------------------------------------------------------------------------
// Runtime support
// ---------------------------------------------------------------------------

#[test]
fn new_records_the_type() {
    let mut context = GenerationContext::new();
    assert_eq!(
        expand_with("$new(Array(3, 0))", &mut context).unwrap(),
        "Array_new(3, 0)"
    );
    assert!(context.new_types_used.contains("Array"));
    assert!(matches!(expand_err("$new(Array)"), ExpandError::BadSyntax { macro_name: "new", .. }));
}

#[test]
fn token_and_type_functions() {
    let mut context = GenerationContext::new();
    assert_eq!(
        expand_with("$tokenFunc(t::print())", &mut context).unwrap(),
        "functionTable[(int)t.type][FUNC_print](t)"
    );
    assert_eq!(
        expand_with("$tokenFunc(t::add(u))", &mut context).unwrap(),
        "functionTable[(int)t.type][FUNC_add](t, u)"
    );
    assert_eq!(
        expand_with("$typeFunc(TYPE_Matrix::convert(x, TYPE_Int))", &mut context).unwrap(),
        "functionTable[(int)TYPE_Matrix][FUNC_convert](x, TYPE_Int)"
    );
    assert!(context.token_functions_used.contains("add"));
    assert!(!context.token_functions_used.contains("convert"));
    assert!(context.functions_used.contains("convert"));
    assert!(context.new_types_used.contains("Matrix"));
    assert_eq!(
        expand_with("$typeFunc(TYPE_Int::zero())", &mut context).unwrap(),
        "functionTable[(int)TYPE_Int][FUNC_zero]()"
    );
    assert!(context.functions_used.contains("zero"));
}

#[test]
fn malformed_function_calls() {
    assert!(matches!(expand_err("$tokenFunc(t.print())"), ExpandError::BadSyntax { .. }));
    assert!(matches!(expand_err("$typeFunc(TYPE_Int::zero)"), ExpandError::BadSyntax { .. }));
}

#[test]
fn fire_at() {
    assert_eq!(
        expand("$fireAt(actor, t, 0)"),
        "struct Director* director = (*(actor->getDirector))(actor);(*(director->fireAt))(director, (struct Actor*)actor, t, 0);"
    );
    assert!(matches!(expand_err("$fireAt(actor)"), ExpandError::BadArguments { .. }));
}

#[test]
fn structure_declares_a_type() {
    let mut context = GenerationContext::new();
    assert_eq!(expand_with("$structure(Point)", &mut context).unwrap(), "");
    assert!(context.new_types_used.contains("PointStructure"));
}

// ---------------------------------------------------------------------------
// Registered macros
// ---------------------------------------------------------------------------

struct Twice;

impl UserMacro for Twice {
    fn check_arguments(&self, arguments: &[String]) -> Result<(), String> {
        match arguments.len() {
            1 => Ok(()),
            n => Err(format!("expected 1 argument, got {}", n)),
        }
    }

    fn handle_macro(&self, arguments: &[String]) -> Result<String, String> {
        Ok(arguments[0].repeat(2))
    }
}

fn registered_context() -> GenerationContext {
    let mut macros = MacroRegistry::default();
    macros.register_adapter("shout", |component| component.name().to_uppercase());
    macros.register_user("twice", Twice);
    GenerationContext::new().with_macros(macros)
}

#[test]
fn adapter_and_user_macros() {
    let mut context = registered_context();
    assert_eq!(expand_with("$shout()", &mut context).unwrap(), "RAMP");
    assert_eq!(expand_with("$twice(ab)", &mut context).unwrap(), "abab");

    let err = expand_with("$twice(a, b)", &mut context).unwrap_err();
    assert!(matches!(innermost(err), ExpandError::UserMacro { name, .. } if name == "twice"));
}

#[test]
fn unknown_macro() {
    assert!(matches!(expand_err("$bogus(1)"), ExpandError::UnknownMacro(name) if name == "bogus"));
}

// ---------------------------------------------------------------------------
// Blocks and connections
// ---------------------------------------------------------------------------

#[test]
fn generate_block_code_expands_a_block() {
    let template = "/*** fireBlock($value) ***/\n$put(output, $value);\n/**/\n";
    let mut stream = CodeStream::from_text(StreamConfig::default(), "Ramp.c", template);
    let component = ramp();
    let mut context = GenerationContext::new();
    let mut parser = TemplateParser::new(&component, &Target::C, &mut context);
    let code = parser
        .generate_block_code(&mut stream, "fireBlock", &["$val(init)".to_string()])
        .unwrap();
    assert_eq!(code, "_model_Ramp_output = 0;\n");
    assert_eq!(stream.output(), "$put(output, $val(init));\n");
}

#[test]
fn missing_block_surfaces_the_stream_error() {
    let mut stream = CodeStream::from_text(StreamConfig::default(), "Ramp.c", "");
    let component = ramp();
    let mut context = GenerationContext::new();
    let mut parser = TemplateParser::new(&component, &Target::C, &mut context);
    let err = parser
        .generate_block_code(&mut stream, "fireBlock", &[])
        .unwrap_err();
    assert!(matches!(err, ExpandError::Block(_)));
}

#[test]
fn type_convert_statements() {
    let source = ramp();
    let sink = ModelComponent::new("Sink", "ptolemy.actor.lib.Sink")
        .with_container(".model")
        .with_port("count", Direction::Input, DataType::Int)
        .with_port("level", Direction::Input, DataType::Double)
        .with_port("any", Direction::Input, DataType::General);

    let mut context = GenerationContext::new();
    let mut parser = TemplateParser::new(&source, &Target::C, &mut context);
    let from = |name: &str| ChannelRef {
        component: &source,
        port: source.ports.iter().find(|p| p.name == name).unwrap(),
        channel: 0,
    };
    let to = |name: &str| ChannelRef {
        component: &sink,
        port: sink.ports.iter().find(|p| p.name == name).unwrap(),
        channel: 0,
    };

    assert_eq!(
        parser
            .generate_type_convert_statement(from("output"), to("level"), "0", None)
            .unwrap(),
        "_model_Sink_level = _model_Ramp_output;\n"
    );
    assert_eq!(
        parser
            .generate_type_convert_statement(from("output"), to("count"), "0", None)
            .unwrap(),
        "_model_Sink_count = DoubletoInt(_model_Ramp_output);\n"
    );
    assert_eq!(
        parser
            .generate_type_convert_statement(from("output"), to("any"), "0", Some("tmp"))
            .unwrap(),
        "_model_Sink_any = $new(Double(tmp));\n"
    );
}

#[test]
fn components_deserialize_from_toml() {
    let component: ModelComponent = toml::from_str(
        r#"
        name = "Scale"
        class = "ptolemy.actor.lib.Scale"
        container = ".top"

        [[ports]]
        name = "input"
        direction = "input"
        type = "double"

        [[ports]]
        name = "output"
        direction = "output"
        type = "arrayType(int,4)"

        [[parameters]]
        name = "factor"
        type = "double"
        expression = "2.0"
        "#,
    )
    .unwrap();

    let mut context = GenerationContext::new();
    let mut parser = TemplateParser::new(&component, &Target::C, &mut context);
    assert_eq!(
        parser
            .process_code("$put(output, $get(input) * $val(factor)); // $size(output)")
            .unwrap(),
        "_top_Scale_output = _top_Scale_input * 2.0; // 4"
    );
}

#[test]
fn nested_record_types_parse() {
    let nested: DataType = "{a = {b = int, c = int}, d = arrayType(double, 2)}".parse().unwrap();
    assert_eq!(
        nested,
        DataType::Record(vec![
            (
                "a".to_string(),
                DataType::Record(vec![
                    ("b".to_string(), DataType::Int),
                    ("c".to_string(), DataType::Int),
                ]),
            ),
            ("d".to_string(), DataType::Array(Box::new(DataType::Double), Some(2))),
        ])
    );
    assert_eq!(nested.to_string(), "{a = {b = int, c = int}, d = arrayType(double,2)}");
    assert_eq!(
        "{{x = int}}".parse::<DataType>().unwrap(),
        DataType::Array(Box::new(DataType::Record(vec![("x".to_string(), DataType::Int)])), None)
    );
}
