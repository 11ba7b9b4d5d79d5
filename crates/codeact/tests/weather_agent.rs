use codeact::core::CodeAgentBuilder;
use codeact::tools::{WeatherTool, WebSearchTool};
use codeact_test_model::TestModelProvider;

#[tokio::test]
async fn test_weather_question() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_text_response(
        "Thought: I will look up the weather first.\n\
         Code:\n\
         ```py\n\
         weather = get_weather(\"Shanghai\", unit=\"c\")\n\
         print(weather)\n\
         ```<end_code>",
    );
    model_provider.add_text_response(
        "Thought: I have the weather now.\n\
         Code:\n\
         ```py\n\
         final_answer(f\"Shanghai is sunny, {weather['temperature']}°C\")\n\
         ```<end_code>",
    );

    let mut agent = CodeAgentBuilder::with_model_provider(model_provider)
        .with_name("Guide")
        .with_tool(WeatherTool::new())
        .with_tool(WebSearchTool::default())
        .build();
    let prompt = agent.system_prompt();
    assert!(prompt.contains("get_weather"));
    assert!(prompt.contains("web_search"));

    let reply = agent
        .reply("How is the weather in Shanghai today?")
        .await
        .unwrap();
    assert_eq!(reply.content, "Shanghai is sunny, 20°C");
    assert_eq!(reply.name, "Guide");
    assert_eq!(reply.iterations, 2);

    let observation = agent.memory().items()[3].content();
    assert!(observation.contains("'temperature': 20"));
}
